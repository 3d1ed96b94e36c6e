//! Store key layout.
//!
//! The live queue and the dead letter queue use disjoint namespaces so that
//! each owner has exclusive write access to its own keys:
//! - `queue:<name>:<id>` / `queue:<name>:pending` for the live queue
//! - `dlq:<name>:<id>` / `dlq:<name>:items` for quarantined items

pub(crate) fn item(queue: &str, id: &str) -> String {
    format!("queue:{queue}:{id}")
}

pub(crate) fn pending(queue: &str) -> String {
    format!("queue:{queue}:pending")
}

pub(crate) fn dlq_item(queue: &str, id: &str) -> String {
    format!("dlq:{queue}:{id}")
}

pub(crate) fn dlq_items(queue: &str) -> String {
    format!("dlq:{queue}:items")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_are_disjoint() {
        assert_eq!(item("emails", "abc"), "queue:emails:abc");
        assert_eq!(pending("emails"), "queue:emails:pending");
        assert_eq!(dlq_item("emails", "abc"), "dlq:emails:abc");
        assert_eq!(dlq_items("emails"), "dlq:emails:items");
    }
}
