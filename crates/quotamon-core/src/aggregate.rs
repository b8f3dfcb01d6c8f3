// ── Pool aggregation ──
//
// Groups flat records by pool and orders the groups worst-first. The only
// state is the user's custom pool names, changed through the setter.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::{QuotaGroup, QuotaRecord, Thresholds};

#[derive(Debug, Default)]
pub struct Aggregator {
    custom_names: RwLock<HashMap<String, String>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear (`None` / blank) the display override for a pool.
    pub fn set_custom_group_name(&self, pool_id: &str, name: Option<&str>) {
        let mut names = self.custom_names.write().expect("group name lock poisoned");
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                names.insert(pool_id.to_owned(), name.to_owned());
            }
            None => {
                names.remove(pool_id);
            }
        }
    }

    /// Replace every override at once.
    pub fn replace_custom_group_names<I, K, V>(&self, names: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fresh: HashMap<String, String> = names
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        *self.custom_names.write().expect("group name lock poisoned") = fresh;
    }

    pub fn custom_group_name(&self, pool_id: &str) -> Option<String> {
        self.custom_names
            .read()
            .expect("group name lock poisoned")
            .get(pool_id)
            .cloned()
    }

    /// Partition `records` by pool id and aggregate each partition.
    ///
    /// Members keep their input order. Groups are sorted worst status
    /// first, then by display name (case-insensitive), then by pool id.
    pub fn group_by_pool(
        &self,
        records: &[QuotaRecord],
        thresholds: &Thresholds,
    ) -> Vec<QuotaGroup> {
        let mut order: Vec<&str> = Vec::new();
        let mut partitions: HashMap<&str, Vec<QuotaRecord>> = HashMap::new();
        for record in records {
            let members = partitions.entry(record.pool_id.as_str()).or_insert_with(|| {
                order.push(record.pool_id.as_str());
                Vec::new()
            });
            members.push(record.clone());
        }

        let names = self.custom_names.read().expect("group name lock poisoned");
        let mut groups: Vec<QuotaGroup> = order
            .into_iter()
            .map(|pool_id| {
                let members = partitions.remove(pool_id).unwrap_or_default();
                QuotaGroup::from_members(pool_id, names.get(pool_id).cloned(), members, thresholds)
            })
            .collect();
        drop(names);

        groups.sort_by(|a, b| {
            a.status
                .severity_rank()
                .cmp(&b.status.severity_rank())
                .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
                .then_with(|| a.pool_id.cmp(&b.pool_id))
        });
        groups
    }

    /// One flat list in group order.
    pub fn flatten_groups(groups: &[QuotaGroup]) -> Vec<QuotaRecord> {
        groups.iter().flat_map(|g| g.members.iter().cloned()).collect()
    }
}
