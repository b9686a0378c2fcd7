//! Deterministic ordering of extension descriptors.
//!
//! Pure function: partitions descriptors into a basic list plus
//! before/after attachment maps, stable-sorts by index, then emits
//! depth-first so each attachment lands next to its target. An
//! explicit visiting chain detects circular before/after references
//! and reports them as a result value.
//!
//! Equal indices preserve registration order. `Vec::sort_by` is a
//! stable sort, so ties never reorder; tests pin this guarantee.

use std::collections::HashMap;

use groupware_core::{EngineError, EngineResult};

use crate::descriptor::{ExtensionSpec, Placement};

/// Before/after attachments whose target id has not registered yet.
///
/// Carried across sorts so a descriptor referencing a not-yet-loaded
/// id waits indefinitely and is retried on every subsequent sort. It
/// is never emitted while its target is missing; this is a documented
/// caveat, not an error.
#[derive(Debug, Clone, Default)]
pub(crate) struct Orphans {
    /// Target id → descriptors placed before it.
    pub before: HashMap<String, Vec<ExtensionSpec>>,
    /// Target id → descriptors placed after it.
    pub after: HashMap<String, Vec<ExtensionSpec>>,
}

impl Orphans {
    /// Total number of waiting descriptors.
    pub fn len(&self) -> usize {
        self.before.values().map(Vec::len).sum::<usize>()
            + self.after.values().map(Vec::len).sum::<usize>()
    }
}

/// Produce a new linear order for a point's descriptors.
///
/// Consumes the current descriptor list plus carried-over orphans and
/// returns the emitted order together with the orphans left for the
/// next sort. On a cycle the input is consumed but nothing is
/// committed by the caller, so the point keeps its previous order.
pub(crate) fn sort(
    point_id: &str,
    extensions: Vec<ExtensionSpec>,
    orphans: Orphans,
) -> EngineResult<(Vec<ExtensionSpec>, Orphans)> {
    let mut befores = orphans.before;
    let mut afters = orphans.after;
    let mut basic = Vec::new();

    for ext in extensions {
        match &ext.placement {
            Some(Placement::Before(target)) => {
                befores.entry(target.clone()).or_default().push(ext);
            }
            Some(Placement::After(target)) => {
                afters.entry(target.clone()).or_default().push(ext);
            }
            None => basic.push(ext),
        }
    }

    basic.sort_by(|a, b| a.index.cmp(&b.index));

    let mut ordered = Vec::with_capacity(basic.len());
    let mut visiting = Vec::new();
    for ext in basic {
        emit(
            point_id,
            ext,
            &mut ordered,
            &mut befores,
            &mut afters,
            &mut visiting,
        )?;
    }

    detect_orphan_cycles(point_id, &befores, &afters)?;

    Ok((
        ordered,
        Orphans {
            before: befores,
            after: afters,
        },
    ))
}

/// Emit one descriptor: its (sorted) befores, itself, its (sorted)
/// afters, each via the same recursive rule. Re-entering an id still
/// on the visiting chain is a cycle.
fn emit(
    point_id: &str,
    ext: ExtensionSpec,
    ordered: &mut Vec<ExtensionSpec>,
    befores: &mut HashMap<String, Vec<ExtensionSpec>>,
    afters: &mut HashMap<String, Vec<ExtensionSpec>>,
    visiting: &mut Vec<String>,
) -> EngineResult<()> {
    if visiting.iter().any(|id| id == &ext.id) {
        return Err(cycle_error(point_id, &ext.id, visiting));
    }
    visiting.push(ext.id.clone());

    if let Some(mut attached) = befores.remove(&ext.id) {
        attached.sort_by(|a, b| a.index.cmp(&b.index));
        for dep in attached {
            emit(point_id, dep, ordered, befores, afters, visiting)?;
        }
    }

    let id = ext.id.clone();
    ordered.push(ext);

    if let Some(mut attached) = afters.remove(&id) {
        attached.sort_by(|a, b| a.index.cmp(&b.index));
        for dep in attached {
            emit(point_id, dep, ordered, befores, afters, visiting)?;
        }
    }

    visiting.pop();
    Ok(())
}

/// Leftover attachments whose targets are themselves leftover
/// attachments can form a cycle no basic descriptor ever reaches
/// (e.g. `a before b` plus `b before a`). Walk each target chain and
/// reject closed loops; chains ending at a genuinely missing id stay
/// orphaned.
fn detect_orphan_cycles(
    point_id: &str,
    befores: &HashMap<String, Vec<ExtensionSpec>>,
    afters: &HashMap<String, Vec<ExtensionSpec>>,
) -> EngineResult<()> {
    let mut targets: HashMap<&str, &str> = HashMap::new();
    for (target, list) in befores.iter().chain(afters.iter()) {
        for ext in list {
            targets.insert(ext.id.as_str(), target.as_str());
        }
    }

    for start in targets.keys() {
        let mut chain = vec![*start];
        let mut current = *start;
        while let Some(&next) = targets.get(current) {
            if chain.contains(&next) {
                return Err(cycle_error(point_id, next, &chain));
            }
            chain.push(next);
            current = next;
        }
    }
    Ok(())
}

fn cycle_error(point_id: &str, at: &str, chain: &[impl AsRef<str>]) -> EngineError {
    let chain: Vec<&str> = chain.iter().map(AsRef::as_ref).collect();
    EngineError::ordering(format!(
        "circular before/after references on point '{point_id}' at extension '{at}' (chain: {})",
        chain.join(" -> ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionSpec;

    fn ids(list: &[ExtensionSpec]) -> Vec<&str> {
        list.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_ascending_index_order() {
        let input = vec![
            ExtensionSpec::new("c").index(300),
            ExtensionSpec::new("a").index(100),
            ExtensionSpec::new("b").index(200),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["a", "b", "c"]);
    }

    #[test]
    fn test_first_and_last_sentinels() {
        let input = vec![
            ExtensionSpec::new("mid").index(100),
            ExtensionSpec::new("tail").last(),
            ExtensionSpec::new("head").first(),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["head", "mid", "tail"]);
    }

    #[test]
    fn test_equal_index_preserves_registration_order() {
        let input = vec![
            ExtensionSpec::new("one").index(100),
            ExtensionSpec::new("two").index(100),
            ExtensionSpec::new("three").index(100),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["one", "two", "three"]);
    }

    #[test]
    fn test_before_attaches_to_target() {
        let input = vec![
            ExtensionSpec::new("b").index(100),
            ExtensionSpec::new("a").index(200),
            ExtensionSpec::new("c").before("a"),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["b", "c", "a"]);
    }

    #[test]
    fn test_nested_attachments() {
        let input = vec![
            ExtensionSpec::new("root").index(100),
            ExtensionSpec::new("child").after("root"),
            ExtensionSpec::new("grandchild").after("child"),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["root", "child", "grandchild"]);
    }

    #[test]
    fn test_orphan_is_retained_and_retried() {
        let input = vec![ExtensionSpec::new("z").after("y")];
        let (ordered, orphans) = sort("test", input, Orphans::default()).unwrap();
        assert!(ordered.is_empty());
        assert_eq!(orphans.len(), 1);

        // once the target registers, a later sort places the orphan
        let input = vec![ExtensionSpec::new("y").index(100)];
        let (ordered, orphans) = sort("test", input, orphans).unwrap();
        assert_eq!(ids(&ordered), ["y", "z"]);
        assert_eq!(orphans.len(), 0);
    }

    #[test]
    fn test_mutual_before_is_a_cycle() {
        let input = vec![
            ExtensionSpec::new("a").before("b"),
            ExtensionSpec::new("b").before("a"),
        ];
        let err = sort("io.ox/mail/detail", input, Orphans::default()).unwrap_err();
        assert!(err.to_string().contains("io.ox/mail/detail"));
    }

    #[test]
    fn test_reachable_cycle_is_detected() {
        let input = vec![
            ExtensionSpec::new("base").index(100),
            ExtensionSpec::new("a").before("base"),
            ExtensionSpec::new("b").before("a"),
            ExtensionSpec::new("base").after("b"),
        ];
        // second "base" creates a loop base -> a -> b -> base
        let result = sort("test", input, Orphans::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_siblings_on_same_target_sorted_by_index() {
        let input = vec![
            ExtensionSpec::new("anchor").index(100),
            ExtensionSpec::new("late").index(200).after("anchor"),
            ExtensionSpec::new("early").index(50).after("anchor"),
        ];
        let (ordered, _) = sort("test", input, Orphans::default()).unwrap();
        assert_eq!(ids(&ordered), ["anchor", "early", "late"]);
    }
}
