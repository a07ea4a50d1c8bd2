use crate::agents::tag_resolver::UpdateCandidate;
use crate::config::Strategy;

/// The candidates that travel together in one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUnit {
    pub candidates: Vec<UpdateCandidate>,
}

impl ChangeUnit {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Result of partitioning: the units to publish now, and how many candidates
/// the limit pushed to a later run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub units: Vec<ChangeUnit>,
    pub deferred: Vec<UpdateCandidate>,
}

pub struct PlanPartitioner;

impl PlanPartitioner {
    /// Groups candidates per strategy. `limit` caps the number of separate
    /// units (0 means unlimited) and has no effect on a joint unit.
    pub fn partition(candidates: Vec<UpdateCandidate>, strategy: Strategy, limit: usize) -> Partition {
        if candidates.is_empty() {
            return Partition::default();
        }

        match strategy {
            Strategy::Joint => Partition {
                units: vec![ChangeUnit { candidates }],
                deferred: Vec::new(),
            },
            Strategy::Separate => {
                let mut units: Vec<ChangeUnit> = candidates
                    .into_iter()
                    .map(|candidate| ChangeUnit {
                        candidates: vec![candidate],
                    })
                    .collect();

                let deferred = if limit > 0 && units.len() > limit {
                    units
                        .split_off(limit)
                        .into_iter()
                        .flat_map(|unit| unit.candidates)
                        .collect()
                } else {
                    Vec::new()
                };

                Partition { units, deferred }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagPrefixes;
    use crate::plugin::{ParsedLocator, PluginReference, RegistryTag};

    fn candidates(names: &[&str]) -> Vec<UpdateCandidate> {
        names
            .iter()
            .map(|name| {
                let locator = format!("oci://ghcr.io/acme/overlays/{name}:next__1.0.0!{name}");
                let plugin = match PluginReference::parse(&locator, &TagPrefixes::default()).unwrap() {
                    ParsedLocator::Tracked(reference) => reference,
                    other => panic!("unexpected {:?}", other),
                };
                UpdateCandidate {
                    plugin,
                    new_tag: RegistryTag::parse("next__1.1.0").unwrap(),
                }
            })
            .collect()
    }

    fn unit_names(partition: &Partition) -> Vec<Vec<String>> {
        partition
            .units
            .iter()
            .map(|u| u.candidates.iter().map(|c| c.plugin.artifact_name.clone()).collect())
            .collect()
    }

    #[test]
    fn separate_with_limit_keeps_first_candidates() {
        let partition = PlanPartitioner::partition(candidates(&["a", "b", "c"]), Strategy::Separate, 1);
        assert_eq!(unit_names(&partition), vec![vec!["a"]]);
        assert_eq!(partition.deferred.len(), 2);
        assert_eq!(partition.deferred[0].plugin.artifact_name, "b");
    }

    #[test]
    fn separate_without_limit_yields_one_unit_each() {
        let partition = PlanPartitioner::partition(candidates(&["a", "b", "c"]), Strategy::Separate, 0);
        assert_eq!(unit_names(&partition), vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert!(partition.deferred.is_empty());
    }

    #[test]
    fn limit_larger_than_candidates_keeps_all() {
        let partition = PlanPartitioner::partition(candidates(&["a", "b"]), Strategy::Separate, 5);
        assert_eq!(partition.units.len(), 2);
        assert!(partition.deferred.is_empty());
    }

    #[test]
    fn joint_ignores_limit() {
        for limit in [0, 1, 2, 10] {
            let partition = PlanPartitioner::partition(candidates(&["a", "b", "c"]), Strategy::Joint, limit);
            assert_eq!(unit_names(&partition), vec![vec!["a", "b", "c"]]);
            assert!(partition.deferred.is_empty());
        }
    }

    #[test]
    fn no_candidates_no_units() {
        for strategy in [Strategy::Separate, Strategy::Joint] {
            let partition = PlanPartitioner::partition(Vec::new(), strategy, 0);
            assert!(partition.units.is_empty());
        }
    }
}
