//! Versioned response buckets
//!
//! One bucket per resource class and version, named `<class>-<version>`.
//! Buckets of other versions are only ever removed wholesale.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::network::{CacheTarget, InterceptedResponse, ResourceClass};

#[derive(Debug, Clone, Default)]
pub struct BucketStore {
    version: String,
    buckets: HashMap<String, HashMap<String, InterceptedResponse>>,
}

impl BucketStore {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            buckets: HashMap::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Name of the current bucket for `class`.
    pub fn bucket_name(&self, class: ResourceClass) -> Option<String> {
        class
            .bucket_class()
            .map(|prefix| format!("{}-{}", prefix, self.version))
    }

    pub fn lookup(&self, class: ResourceClass, id: &str) -> Option<InterceptedResponse> {
        let name = self.bucket_name(class)?;
        self.buckets.get(&name)?.get(id).cloned()
    }

    /// Stores a response fetched under `version`. A response from a version
    /// that is no longer current is dropped.
    pub fn store(
        &mut self,
        class: ResourceClass,
        version: &str,
        id: &str,
        response: InterceptedResponse,
    ) -> bool {
        if version != self.version {
            debug!("Dropping {} response fetched under version {}", id, version);
            return false;
        }
        let Some(name) = self.bucket_name(class) else {
            return false;
        };
        self.buckets
            .entry(name)
            .or_default()
            .insert(id.to_string(), response);
        true
    }

    pub fn purge(&mut self, class: ResourceClass, id: &str) -> bool {
        let Some(name) = self.bucket_name(class) else {
            return false;
        };
        self.buckets
            .get_mut(&name)
            .map(|bucket| bucket.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Deletes every bucket the target covers, of any version.
    /// Returns the deleted bucket names.
    pub fn clear(&mut self, target: CacheTarget) -> Vec<String> {
        let prefixes: Vec<String> = target
            .classes()
            .into_iter()
            .filter_map(ResourceClass::bucket_class)
            .map(|class| format!("{}-", class))
            .collect();

        self.delete_where(|name| prefixes.iter().any(|p| name.starts_with(p.as_str())))
    }

    /// Switches to `version` and deletes every bucket of another version.
    pub fn activate(&mut self, version: &str) -> Vec<String> {
        self.version = version.to_string();
        let suffix = format!("-{}", version);
        let deleted = self.delete_where(|name| !name.ends_with(&suffix));
        info!(
            "Bucket version {} active, {} old buckets deleted",
            version,
            deleted.len()
        );
        deleted
    }

    fn delete_where(&mut self, doomed: impl Fn(&str) -> bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .buckets
            .keys()
            .filter(|name| doomed(name))
            .cloned()
            .collect();
        names.sort();
        for name in &names {
            self.buckets.remove(name);
        }
        names
    }

    /// Entry count per bucket name.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.buckets
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.len()))
            .collect()
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.stats().into_keys().collect()
    }
}
