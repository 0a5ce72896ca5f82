//! Fixture generation and loading.
//!
//! Generated fixtures are deterministic JSON documents in a handful of shapes
//! that stress different parts of a cleaner (breadth, depth, prune ratio).
//! Each shape draws from its own `ChaCha8Rng` seeded from the master seed and
//! the shape index, so shapes can be built in parallel and still reproduce.
//!
//! Fixture directories hold one `*.json` document per fixture; the id is the
//! path relative to the directory, without the extension.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{BenchError, Result};
use crate::schema::FixtureInfo;
use crate::session::{Fixture, FixtureSource};

/// Document shapes produced by the generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// One wide object of scalar leaves.
    Flat,
    /// Array of small records.
    Wide,
    /// Single long chain of nested objects.
    Deep,
    /// Mostly nulls and empties; most of the tree is pruned.
    Sparse,
    /// Random tree mixing all of the above.
    Mixed,
}

impl Shape {
    pub const ALL: [Shape; 5] = [Shape::Flat, Shape::Wide, Shape::Deep, Shape::Sparse, Shape::Mixed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Flat => "flat",
            Shape::Wide => "wide",
            Shape::Deep => "deep",
            Shape::Sparse => "sparse",
            Shape::Mixed => "mixed",
        }
    }
}

/// Configuration for fixture generation.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    pub seed: u64,
    /// Size multiplier; 1 gives documents of a few KB.
    pub scale: usize,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self { seed: 42, scale: 1 }
    }
}

fn per_fixture_seed(master_seed: u64, index: usize) -> u64 {
    master_seed
        .wrapping_add(index as u64)
        .wrapping_mul(0x517cc1b727220a95)
}

/// A scalar or empty leaf; `empty_bias` is the probability of a prunable one.
fn leaf(rng: &mut ChaCha8Rng, empty_bias: f64) -> Value {
    if rng.gen_bool(empty_bias) {
        return match rng.gen_range(0..4) {
            0 => Value::Null,
            1 => json!(""),
            2 => json!([]),
            _ => json!({}),
        };
    }
    match rng.gen_range(0..4) {
        0 => json!(rng.gen_range(-1_000_000i64..1_000_000)),
        1 => json!(rng.gen::<f64>()),
        2 => json!(rng.gen_bool(0.5)),
        _ => json!(format!("v{:x}", rng.gen::<u32>())),
    }
}

fn record(rng: &mut ChaCha8Rng, fields: usize, empty_bias: f64) -> Value {
    let map: Map<String, Value> = (0..fields)
        .map(|i| (format!("f{i}"), leaf(rng, empty_bias)))
        .collect();
    Value::Object(map)
}

fn random_tree(rng: &mut ChaCha8Rng, depth: usize) -> Value {
    if depth == 0 || rng.gen_bool(0.25) {
        return leaf(rng, 0.3);
    }
    let width = rng.gen_range(1..=5);
    if rng.gen_bool(0.5) {
        Value::Array((0..width).map(|_| random_tree(rng, depth - 1)).collect())
    } else {
        Value::Object(
            (0..width)
                .map(|i| (format!("k{i}"), random_tree(rng, depth - 1)))
                .collect(),
        )
    }
}

/// Generate one document of `shape`.
pub fn generate_shape(shape: Shape, rng: &mut ChaCha8Rng, scale: usize) -> Value {
    let scale = scale.max(1);
    match shape {
        Shape::Flat => record(rng, 64 * scale, 0.3),
        Shape::Wide => Value::Array((0..32 * scale).map(|_| record(rng, 6, 0.25)).collect()),
        Shape::Deep => {
            // serde_json refuses to parse past 128 levels; stay well under.
            let depth = (24 * scale).min(100);
            let mut node = record(rng, 2, 0.5);
            for _ in 0..depth {
                node = json!({ "child": node, "pad": leaf(rng, 0.5), "gap": null });
            }
            node
        }
        Shape::Sparse => Value::Array(
            (0..16 * scale)
                .map(|_| json!({ "a": leaf(rng, 0.9), "b": [leaf(rng, 0.9), leaf(rng, 0.9)] }))
                .collect(),
        ),
        Shape::Mixed => Value::Array((0..4 * scale).map(|_| random_tree(rng, 6)).collect()),
    }
}

/// Generate one fixture per shape, in parallel, in `Shape::ALL` order.
pub fn generate_fixtures(config: &GenerateConfig) -> Vec<Fixture<Value>> {
    // Range is an IndexedParallelIterator; collect preserves order.
    (0..Shape::ALL.len())
        .into_par_iter()
        .map(|i| {
            let shape = Shape::ALL[i];
            let mut rng = ChaCha8Rng::seed_from_u64(per_fixture_seed(config.seed, i));
            Fixture::new(shape.as_str(), generate_shape(shape, &mut rng, config.scale))
        })
        .collect()
}

/// Load every `*.json` file under `dir`, sorted by id.
pub fn load_dir(dir: &Path) -> Result<Vec<Fixture<Value>>> {
    if !dir.is_dir() {
        return Err(BenchError::config(format!(
            "fixture path {} is not a directory",
            dir.display()
        )));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| BenchError::Io(e.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "json") {
            continue;
        }

        let text = fs::read_to_string(path)?;
        let value = serde_json::from_str(&text).map_err(|source| BenchError::FixtureParse {
            path: path.display().to_string(),
            source,
        })?;
        out.push(Fixture::new(fixture_id(dir, path), value));
    }

    tracing::info!(dir = %dir.display(), count = out.len(), "loaded fixtures");
    Ok(out)
}

fn fixture_id(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path).with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write fixtures as pretty JSON files named `<id>.json`.
pub fn write_fixtures(dir: &Path, fixtures: &[Fixture<Value>]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(fixtures.len());
    for f in fixtures {
        let path = dir.join(format!("{}.json", f.id));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&f.value).map_err(std::io::Error::other)?;
        fs::write(&path, json)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Content identity of a fixture: SHA-256 over its compact JSON encoding.
pub fn fingerprint(fixture: &Fixture<Value>) -> FixtureInfo {
    let bytes = serde_json::to_vec(&fixture.value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    FixtureInfo {
        id: fixture.id.clone(),
        sha256: digest.iter().map(|b| format!("{b:02x}")).collect(),
        bytes: bytes.len() as u64,
    }
}

/// Fixtures read from a directory on each call.
#[derive(Debug, Clone)]
pub struct DirSource {
    pub dir: PathBuf,
}

impl FixtureSource<Value> for DirSource {
    fn fixtures(&self) -> Result<Vec<Fixture<Value>>> {
        load_dir(&self.dir)
    }
}

/// Fixtures produced by the built-in generator.
#[derive(Debug, Clone, Default)]
pub struct GeneratedSource {
    pub config: GenerateConfig,
}

impl FixtureSource<Value> for GeneratedSource {
    fn fixtures(&self) -> Result<Vec<Fixture<Value>>> {
        Ok(generate_fixtures(&self.config))
    }
}
