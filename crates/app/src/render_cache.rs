/// The last render attempted for one view: either its result or the key
/// that failed, so a failing render is not retried every frame.
pub struct RenderCache<K, T> {
    slot: Slot<K, T>,
}

enum Slot<K, T> {
    Empty,
    Ready(K, T),
    Failed(K),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a, T> {
    Hit(&'a T),
    Failed,
    Miss,
}

impl<K: PartialEq, T> RenderCache<K, T> {
    pub fn lookup(&self, key: &K) -> Lookup<'_, T> {
        match &self.slot {
            Slot::Ready(cached, value) if cached == key => Lookup::Hit(value),
            Slot::Failed(cached) if cached == key => Lookup::Failed,
            _ => Lookup::Miss,
        }
    }

    pub fn fill(&mut self, key: K, value: T) {
        self.slot = Slot::Ready(key, value);
    }

    pub fn fail(&mut self, key: K) {
        self.slot = Slot::Failed(key);
    }

    pub fn ready(&self) -> Option<(&K, &T)> {
        match &self.slot {
            Slot::Ready(key, value) => Some((key, value)),
            _ => None,
        }
    }
}

impl<K, T> Default for RenderCache<K, T> {
    fn default() -> Self {
        Self { slot: Slot::Empty }
    }
}
