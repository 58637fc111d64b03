//! Worker name pool. Hands out short identifiers of the form
//! `worker<N>`, preferring recycled ids over new allocations. Grounded in
//! the style of small, dependency-free teacher services like
//! `priority_calculator.rs` — a plain struct with no I/O.

const NAME_PREFIX: &str = "worker";

#[derive(Debug, Default)]
pub struct NamePool {
    next: u32,
    recycled: Vec<u32>,
}

impl NamePool {
    pub fn new() -> Self {
        Self {
            next: 1,
            recycled: Vec::new(),
        }
    }

    /// Hands out the smallest recycled id, else allocates a fresh one.
    pub fn acquire(&mut self) -> String {
        let n = if self.recycled.is_empty() {
            let n = self.next;
            self.next += 1;
            n
        } else {
            self.recycled.sort_unstable();
            self.recycled.remove(0)
        };
        format!("{NAME_PREFIX}{n}")
    }

    /// Returns a name to the pool. Deduplicates; ignores names that don't
    /// match the `worker<N>` shape.
    pub fn release(&mut self, name: &str) {
        let Some(n) = parse_index(name) else {
            return;
        };
        if n < self.next && !self.recycled.contains(&n) {
            self.recycled.push(n);
        }
    }

    /// Re-derives pool state from a set of names currently in use (e.g.
    /// after process restart). `next` becomes one past the highest id in
    /// use; the recycled list is cleared, since recycling candidates are
    /// only ids we've seen and released ourselves.
    pub fn reconcile(&mut self, in_use: impl IntoIterator<Item = String>) {
        let max_in_use = in_use
            .into_iter()
            .filter_map(|name| parse_index(&name))
            .max();
        self.next = max_in_use.map_or(1, |m| m + 1);
        self.recycled.clear();
    }
}

fn parse_index(name: &str) -> Option<u32> {
    name.strip_prefix(NAME_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_ascending_names_when_nothing_recycled() {
        let mut pool = NamePool::new();
        assert_eq!(pool.acquire(), "worker1");
        assert_eq!(pool.acquire(), "worker2");
        assert_eq!(pool.acquire(), "worker3");
    }

    #[test]
    fn prefers_recycled_ids_sorted_ascending() {
        let mut pool = NamePool::new();
        let _ = pool.acquire(); // worker1
        let _ = pool.acquire(); // worker2
        let _ = pool.acquire(); // worker3
        pool.release("worker2");
        pool.release("worker1");
        assert_eq!(pool.acquire(), "worker1");
        assert_eq!(pool.acquire(), "worker2");
        assert_eq!(pool.acquire(), "worker4");
    }

    #[test]
    fn release_deduplicates() {
        let mut pool = NamePool::new();
        let _ = pool.acquire();
        pool.release("worker1");
        pool.release("worker1");
        assert_eq!(pool.acquire(), "worker1");
        assert_eq!(pool.acquire(), "worker2");
    }

    #[test]
    fn release_ignores_invalid_names() {
        let mut pool = NamePool::new();
        pool.release("not-a-worker");
        pool.release("worker");
        pool.release("workerabc");
        assert_eq!(pool.acquire(), "worker1");
    }

    #[test]
    fn reconcile_sets_next_past_max_and_clears_recycled() {
        let mut pool = NamePool::new();
        pool.release("worker5");
        pool.reconcile(["worker2".to_string(), "worker7".to_string()]);
        assert_eq!(pool.acquire(), "worker8");
    }

    #[test]
    fn reconcile_with_no_in_use_names_resets_to_one() {
        let mut pool = NamePool::new();
        let _ = pool.acquire();
        let _ = pool.acquire();
        pool.reconcile(Vec::<String>::new());
        assert_eq!(pool.acquire(), "worker1");
    }
}
