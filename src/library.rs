use crate::cache::CacheLayer;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct Library {
    paths: Vec<String>,
    current: Option<usize>,
    selection: HashSet<String>,
    caches: CacheLayer,
    label: String,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new sequence. Later duplicates of a path are dropped so the
    /// first occurrence keeps its position.
    pub fn load(&mut self, paths: Vec<String>, label: &str) {
        let mut seen = HashSet::with_capacity(paths.len());
        self.paths = paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();
        self.selection.clear();
        self.caches.clear();
        self.current = if self.paths.is_empty() { None } else { Some(0) };
        self.label = label.to_string();
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.selection.clear();
        self.caches.clear();
        self.current = None;
        self.label.clear();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index_of(path).is_some()
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_path(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.paths.get(i))
            .map(String::as_str)
    }

    pub fn set_current(&mut self, index: usize) -> bool {
        if index >= self.paths.len() {
            return false;
        }
        self.current = Some(index);
        true
    }

    pub fn previous(&mut self) -> bool {
        match self.current.and_then(|i| i.checked_sub(1)) {
            Some(i) => self.set_current(i),
            None => false,
        }
    }

    pub fn next(&mut self) -> bool {
        match self.current {
            Some(i) => self.set_current(i + 1),
            None => false,
        }
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.selection.contains(path)
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    pub fn toggle_select(&mut self, path: &str) -> bool {
        if !self.contains(path) {
            return false;
        }
        if !self.selection.remove(path) {
            self.selection.insert(path.to_string());
            return true;
        }
        false
    }

    pub fn select_all(&mut self) {
        self.selection = self.paths.iter().cloned().collect();
    }

    pub fn select_none(&mut self) {
        self.selection.clear();
    }

    pub fn selection_snapshot(&self) -> Vec<String> {
        self.paths
            .iter()
            .filter(|p| self.selection.contains(p.as_str()))
            .cloned()
            .collect()
    }

    /// What a trash/move acts on: the selection when there is one, else the
    /// viewed item, else nothing.
    pub fn batch_targets(&self) -> Vec<String> {
        if !self.selection.is_empty() {
            return self.selection_snapshot();
        }
        self.current_path()
            .map(|p| vec![p.to_string()])
            .unwrap_or_default()
    }

    pub fn caches(&self) -> &CacheLayer {
        &self.caches
    }

    pub fn caches_mut(&mut self) -> &mut CacheLayer {
        &mut self.caches
    }

    /// A removal at or before the viewed position shifts the viewed index back by one.
    pub fn remove(&mut self, path: &str) -> bool {
        let Some(idx) = self.index_of(path) else {
            return false;
        };
        self.paths.remove(idx);
        self.current = match self.current {
            _ if self.paths.is_empty() => None,
            Some(cur) if idx <= cur && cur > 0 => Some(cur - 1),
            other => other,
        };
        self.selection.remove(path);
        self.caches.invalidate(path);
        true
    }

    /// When `new` is already in the library the two slots collapse into `new`'s
    /// and its caches are dropped.
    pub fn replace(&mut self, old: &str, new: &str) -> bool {
        let Some(idx) = self.index_of(old) else {
            return false;
        };
        if old == new {
            return true;
        }

        if self.contains(new) {
            let was_current = self.current == Some(idx);
            let was_selected = self.selection.contains(old);
            self.remove(old);
            self.caches.invalidate(new);
            if was_selected {
                self.selection.insert(new.to_string());
            }
            if was_current {
                self.current = self.index_of(new);
            }
            return true;
        }

        self.paths[idx] = new.to_string();
        if self.selection.remove(old) {
            self.selection.insert(new.to_string());
        }
        self.caches.rekey(old, new);
        true
    }
}
