//! Deep-object cleaners under comparison.
//!
//! Cleaning drops `null` values and empty strings, then drops any array or
//! object that is left empty, all the way down. The root itself is never
//! dropped: a root that cleans away entirely comes back as an empty value of
//! the same kind.
//!
//! All three implementations must agree on every input.

use serde_json::{Map, Value};

use crate::runner::Contender;
use crate::CleanerVariant;

fn empty_like(v: &Value) -> Value {
    match v {
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Map::new()),
        Value::String(_) => Value::String(String::new()),
        other => other.clone(),
    }
}

fn clean_value(v: &Value) -> Option<Value> {
    match v {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let out: Vec<Value> = items.iter().filter_map(clean_value).collect();
            (!out.is_empty()).then_some(Value::Array(out))
        }
        Value::Object(map) => {
            let out: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| clean_value(v).map(|v| (k.clone(), v)))
                .collect();
            (!out.is_empty()).then_some(Value::Object(out))
        }
        other => Some(other.clone()),
    }
}

/// Builds a cleaned copy by plain recursion.
pub fn clean_recursive(v: &Value) -> Value {
    clean_value(v).unwrap_or_else(|| empty_like(v))
}

/// Returns whether `v` survives; prunes its children in place.
fn prune(v: &mut Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => {
            items.retain_mut(prune);
            !items.is_empty()
        }
        Value::Object(map) => {
            map.retain(|_, v| prune(v));
            !map.is_empty()
        }
        _ => true,
    }
}

/// Cleans an owned value without rebuilding it.
pub fn clean_in_place(mut v: Value) -> Value {
    // A pruned-away root is already empty (or null) after `prune`.
    let _ = prune(&mut v);
    v
}

enum Frame<'a> {
    Array(std::slice::Iter<'a, Value>, Vec<Value>),
    Object(serde_json::map::Iter<'a>, Map<String, Value>, Option<&'a String>),
}

impl<'a> Frame<'a> {
    fn next_child(&mut self) -> Option<&'a Value> {
        match self {
            Frame::Array(it, _) => it.next(),
            Frame::Object(it, _, key) => it.next().map(|(k, v)| {
                *key = Some(k);
                v
            }),
        }
    }

    fn absorb(&mut self, child: Option<Value>) {
        let Some(child) = child else { return };
        match self {
            Frame::Array(_, out) => out.push(child),
            Frame::Object(_, out, key) => {
                if let Some(k) = key.take() {
                    out.insert(k.clone(), child);
                }
            }
        }
    }

    fn finish(self) -> Option<Value> {
        match self {
            Frame::Array(_, out) => (!out.is_empty()).then_some(Value::Array(out)),
            Frame::Object(_, out, _) => (!out.is_empty()).then_some(Value::Object(out)),
        }
    }
}

enum Step<'a> {
    Leaf(Option<Value>),
    Open(Frame<'a>),
}

fn step(v: &Value) -> Step<'_> {
    match v {
        Value::Null => Step::Leaf(None),
        Value::String(s) if s.is_empty() => Step::Leaf(None),
        Value::Array(items) => Step::Open(Frame::Array(items.iter(), Vec::new())),
        Value::Object(map) => Step::Open(Frame::Object(map.iter(), Map::new(), None)),
        other => Step::Leaf(Some(other.clone())),
    }
}

/// Builds a cleaned copy with an explicit stack; depth is bounded only by heap.
pub fn clean_iterative(root: &Value) -> Value {
    let mut stack = match step(root) {
        Step::Leaf(v) => return v.unwrap_or_else(|| empty_like(root)),
        Step::Open(frame) => vec![frame],
    };

    let mut carry: Option<Option<Value>> = None;
    while let Some(top) = stack.last_mut() {
        if let Some(done) = carry.take() {
            top.absorb(done);
        }
        match top.next_child() {
            Some(child) => match step(child) {
                Step::Leaf(v) => carry = Some(v),
                Step::Open(frame) => stack.push(frame),
            },
            None => {
                let finished = stack.pop().and_then(Frame::finish);
                if stack.is_empty() {
                    return finished.unwrap_or_else(|| empty_like(root));
                }
                carry = Some(finished);
            }
        }
    }
    empty_like(root)
}

/// Contenders selected by `variant`, in a stable registration order.
pub fn registry(variant: CleanerVariant) -> Vec<Contender<Value>> {
    let all = matches!(variant, CleanerVariant::All);
    let mut out = Vec::new();
    if all || variant == CleanerVariant::Recursive {
        out.push(Contender::pure("recursive", |v: &Value| Ok(clean_recursive(v))));
    }
    if all || variant == CleanerVariant::InPlace {
        out.push(Contender::mutating("in_place", |v: Value| Ok(clean_in_place(v))));
    }
    if all || variant == CleanerVariant::Iterative {
        out.push(Contender::pure("iterative", |v: &Value| Ok(clean_iterative(v))));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_agree(input: &Value) -> Value {
        let a = clean_recursive(input);
        let b = clean_in_place(input.clone());
        let c = clean_iterative(input);
        assert_eq!(a, b, "in_place disagrees on {input}");
        assert_eq!(a, c, "iterative disagrees on {input}");
        a
    }

    #[test]
    fn test_drops_nulls_and_empties() {
        let input = json!({
            "a": 1,
            "b": null,
            "c": "",
            "d": {"e": null, "f": [null, "", {}]},
            "g": [1, null, "x", []],
            "h": false,
            "i": 0
        });
        let out = all_agree(&input);
        assert_eq!(out, json!({"a": 1, "g": [1, "x"], "h": false, "i": 0}));
    }

    #[test]
    fn test_root_never_dropped() {
        assert_eq!(all_agree(&json!({"a": null})), json!({}));
        assert_eq!(all_agree(&json!([null, [""]])), json!([]));
        assert_eq!(all_agree(&Value::Null), Value::Null);
        assert_eq!(all_agree(&json!("")), json!(""));
        assert_eq!(all_agree(&json!(3.5)), json!(3.5));
    }

    #[test]
    fn test_deep_nesting() {
        let mut v = json!({"leaf": 1, "gap": null});
        for i in 0..200 {
            v = json!({ "child": v, "pad": i, "empty": {} });
        }
        let out = all_agree(&v);
        assert!(out.get("empty").is_none());
        assert!(out.get("child").is_some());
    }

    #[test]
    fn test_registry_selection() {
        let names = |v| {
            registry(v)
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(CleanerVariant::All), vec!["recursive", "in_place", "iterative"]);
        assert_eq!(names(CleanerVariant::InPlace), vec!["in_place"]);

        let regs = registry(CleanerVariant::All);
        assert!(!regs[0].mutates_input());
        assert!(regs[1].mutates_input());
    }

    #[test]
    fn test_registered_contenders_match_reference() {
        let input = json!({"k": [null, {"x": ""}, 2], "z": "keep"});
        let expected = clean_recursive(&input);
        for c in registry(CleanerVariant::All) {
            assert_eq!(c.apply(&input).unwrap(), expected, "{}", c.name());
        }
    }

    #[test]
    fn test_session_over_generated_fixtures() {
        use crate::fixtures::GeneratedSource;
        use crate::harness::HarnessConfig;
        use crate::memory::{ReclaimSupport, ScriptedSampler};
        use crate::schema::{FixtureReport, OverallReport};
        use crate::session::{ReportSink, Session};

        #[derive(Default)]
        struct Count(usize);
        impl ReportSink for Count {
            fn on_fixture(&mut self, _report: &FixtureReport) {
                self.0 += 1;
            }
            fn on_overall(&mut self, _report: &OverallReport) {}
        }

        let session = Session::new(HarnessConfig {
            warmup_iterations: 1,
            measured_iterations: 3,
            seed: Some(1),
            ..Default::default()
        })
        .unwrap();
        let mut sampler = ScriptedSampler::flat(ReclaimSupport::Available);
        let mut sink = Count::default();
        let contenders = || registry(CleanerVariant::All);
        let overall = session
            .run(&GeneratedSource::default(), &contenders, &mut sampler, &mut sink)
            .unwrap();

        assert_eq!(sink.0, 5);
        assert_eq!(overall.fixtures_processed, 5);
        assert_eq!(overall.ranking.len(), 3);
        for s in overall.per_contender.values() {
            assert_eq!(s.fixtures_measured, 5);
            assert_eq!(s.fixtures_errored, 0);
        }
    }
}
