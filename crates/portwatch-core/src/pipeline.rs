//! Search, filter and sort over a raw record set.
//!
//! Every function here is pure. The stages run in a fixed order and each one
//! sees only what the previous stage kept:
//!
//! 1. search text (case-insensitive substring over name, port, address, user, pid)
//! 2. protocol
//! 3. current user (majority vote over the survivors, `root` excluded)
//! 4. port range
//! 5. stable sort on the selected column
//!
//! The result is a list of indices into the input slice, so the derived view
//! can never hold a record that is not in the raw set.

use crate::criteria::{FilterCriteria, SortColumn, SortDirection, SortSpec, UserFilter};
use crate::PortRecord;
use std::cmp::Ordering;
use std::collections::HashMap;

pub const PRIVILEGED_USER: &str = "root";

pub type Comparator = fn(&PortRecord, &PortRecord) -> Ordering;

/// Column to comparator dispatch. Numeric columns compare numerically, text
/// columns go through [`collate`].
pub fn comparator(column: SortColumn) -> Comparator {
    match column {
        SortColumn::Port => |a, b| a.port.cmp(&b.port),
        SortColumn::Process => |a, b| collate(&a.process_name, &b.process_name),
        SortColumn::Pid => |a, b| a.pid.cmp(&b.pid),
        SortColumn::Protocol => |a, b| collate(a.protocol.as_str(), b.protocol.as_str()),
        SortColumn::Address => |a, b| collate(&a.address, &b.address),
        SortColumn::User => |a, b| collate(&a.user, &b.user),
    }
}

/// Case-folded comparison first, exact comparison as the tie-break, so
/// `"apache" < "Bind" < "bind"`.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

pub fn matches_search(record: &PortRecord, lowered_query: &str) -> bool {
    record.process_name.to_lowercase().contains(lowered_query)
        || record.port.to_string().contains(lowered_query)
        || record.address.to_lowercase().contains(lowered_query)
        || record.user.to_lowercase().contains(lowered_query)
        || record.pid.to_string().contains(lowered_query)
}

/// Most frequent owner among `records`, ignoring `root`. Ties go to the user
/// seen first.
pub fn current_user<'a>(records: impl IntoIterator<Item = &'a PortRecord>) -> Option<&'a str> {
    let mut counts: HashMap<&'a str, usize> = HashMap::new();
    let mut order: Vec<&'a str> = Vec::new();
    for record in records {
        let count = counts.entry(record.user.as_str()).or_insert(0);
        if *count == 0 {
            order.push(record.user.as_str());
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for user in order {
        if user == PRIVILEGED_USER {
            continue;
        }
        let count = counts.get(user).copied().unwrap_or(0);
        if best.map_or(true, |(_, max)| count > max) {
            best = Some((user, count));
        }
    }
    best.map(|(user, _)| user)
}

/// Runs the full pipeline and returns indices into `records` in display order.
pub fn derive_indices(
    records: &[PortRecord],
    search: &str,
    filters: &FilterCriteria,
    sort: SortSpec,
) -> Vec<usize> {
    let query = search.to_lowercase();
    let protocol = filters.protocol.selected();

    let mut indices: Vec<usize> = (0..records.len())
        .filter(|&idx| query.is_empty() || matches_search(&records[idx], &query))
        .filter(|&idx| protocol.map_or(true, |selected| records[idx].protocol == selected))
        .collect();

    if filters.user == UserFilter::CurrentUser {
        if let Some(user) = current_user(indices.iter().map(|&idx| &records[idx])) {
            indices.retain(|&idx| records[idx].user == user);
        }
    }

    if let Some(range) = filters.port_range {
        indices.retain(|&idx| range.contains(records[idx].port));
    }

    let compare = comparator(sort.column);
    indices.sort_by(|&a, &b| {
        let ordering = compare(&records[a], &records[b]);
        match sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ProtocolFilter;
    use crate::{PortRange, Protocol};

    fn record(pid: u32, name: &str, port: u16, protocol: Protocol, user: &str) -> PortRecord {
        PortRecord {
            pid,
            process_name: name.to_string(),
            port,
            protocol,
            address: "127.0.0.1".to_string(),
            user: user.to_string(),
        }
    }

    fn ports(records: &[PortRecord], indices: &[usize]) -> Vec<u16> {
        indices.iter().map(|&idx| records[idx].port).collect()
    }

    #[test]
    fn range_then_search_then_descending_sort() {
        let records = vec![
            record(1, "sshd", 22, Protocol::Tcp, "root"),
            record(2, "nginx", 80, Protocol::Tcp, "www"),
            record(3, "node", 8080, Protocol::Tcp, "alice"),
        ];
        let filters = FilterCriteria {
            port_range: Some(PortRange { start: 80, end: 9000 }),
            ..FilterCriteria::default()
        };

        let ranged = derive_indices(&records, "", &filters, SortSpec::default());
        assert_eq!(ports(&records, &ranged), vec![80, 8080]);

        let searched = derive_indices(&records, "80", &filters, SortSpec::default());
        assert_eq!(ports(&records, &searched), vec![80, 8080]);

        let sorted = derive_indices(
            &records,
            "80",
            &filters,
            SortSpec {
                column: SortColumn::Port,
                direction: SortDirection::Descending,
            },
        );
        assert_eq!(ports(&records, &sorted), vec![8080, 80]);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let mut records = vec![
            record(4242, "Postgres", 5432, Protocol::Tcp, "postgres"),
            record(7, "dnsmasq", 53, Protocol::Udp, "nobody"),
        ];
        records[1].address = "10.0.0.1".to_string();

        let search = |query: &str| {
            derive_indices(&records, query, &FilterCriteria::default(), SortSpec::default())
        };
        assert_eq!(search("POSTGRES"), vec![0]);
        assert_eq!(search("424"), vec![0]);
        assert_eq!(search("10.0"), vec![1]);
        assert_eq!(search("nob"), vec![1]);
    }

    #[test]
    fn protocol_filter_keeps_selected_protocol() {
        let records = vec![
            record(1, "a", 53, Protocol::Udp, "x"),
            record(2, "b", 80, Protocol::Tcp, "x"),
        ];
        let filters = FilterCriteria {
            protocol: ProtocolFilter::Udp,
            ..FilterCriteria::default()
        };
        assert_eq!(
            derive_indices(&records, "", &filters, SortSpec::default()),
            vec![0]
        );
    }

    #[test]
    fn current_user_is_majority_excluding_root() {
        let records = vec![
            record(1, "a", 1, Protocol::Tcp, "root"),
            record(2, "b", 2, Protocol::Tcp, "root"),
            record(3, "c", 3, Protocol::Tcp, "root"),
            record(4, "d", 4, Protocol::Tcp, "bob"),
            record(5, "e", 5, Protocol::Tcp, "alice"),
            record(6, "f", 6, Protocol::Tcp, "alice"),
        ];
        assert_eq!(current_user(&records), Some("alice"));

        let filters = FilterCriteria {
            user: UserFilter::CurrentUser,
            ..FilterCriteria::default()
        };
        let kept = derive_indices(&records, "", &filters, SortSpec::default());
        assert_eq!(kept, vec![4, 5]);
    }

    #[test]
    fn current_user_tie_goes_to_first_seen() {
        let records = vec![
            record(1, "a", 1, Protocol::Tcp, "bob"),
            record(2, "b", 2, Protocol::Tcp, "alice"),
        ];
        assert_eq!(current_user(&records), Some("bob"));
    }

    #[test]
    fn current_user_filter_is_noop_when_only_root() {
        let records = vec![
            record(1, "a", 1, Protocol::Tcp, "root"),
            record(2, "b", 2, Protocol::Tcp, "root"),
        ];
        let filters = FilterCriteria {
            user: UserFilter::CurrentUser,
            ..FilterCriteria::default()
        };
        assert_eq!(
            derive_indices(&records, "", &filters, SortSpec::default()),
            vec![0, 1]
        );
    }

    #[test]
    fn current_user_is_computed_after_search() {
        let records = vec![
            record(1, "web", 80, Protocol::Tcp, "alice"),
            record(2, "web", 81, Protocol::Tcp, "alice"),
            record(3, "db", 5432, Protocol::Tcp, "bob"),
        ];
        let filters = FilterCriteria {
            user: UserFilter::CurrentUser,
            ..FilterCriteria::default()
        };
        let kept = derive_indices(&records, "db", &filters, SortSpec::default());
        assert_eq!(kept, vec![2]);
    }

    #[test]
    fn equal_keys_keep_input_order_in_both_directions() {
        let records = vec![
            record(30, "svc", 80, Protocol::Tcp, "x"),
            record(10, "svc", 80, Protocol::Udp, "x"),
            record(20, "svc", 80, Protocol::Tcp, "y"),
        ];
        let asc = derive_indices(&records, "", &FilterCriteria::default(), SortSpec::default());
        let desc = derive_indices(
            &records,
            "",
            &FilterCriteria::default(),
            SortSpec {
                column: SortColumn::Port,
                direction: SortDirection::Descending,
            },
        );
        assert_eq!(asc, vec![0, 1, 2]);
        assert_eq!(desc, vec![0, 1, 2]);
    }

    #[test]
    fn text_columns_collate_case_folded() {
        assert_eq!(collate("apache", "Bind"), Ordering::Less);
        assert_eq!(collate("Bind", "bind"), Ordering::Less);
        assert_eq!(collate("same", "same"), Ordering::Equal);

        let records = vec![
            record(1, "zeta", 1, Protocol::Tcp, "x"),
            record(2, "Alpha", 2, Protocol::Tcp, "x"),
            record(3, "beta", 3, Protocol::Tcp, "x"),
        ];
        let sorted = derive_indices(
            &records,
            "",
            &FilterCriteria::default(),
            SortSpec {
                column: SortColumn::Process,
                direction: SortDirection::Ascending,
            },
        );
        assert_eq!(sorted, vec![1, 2, 0]);
    }

    #[test]
    fn repeated_derivation_is_identical_and_leaves_input_untouched() {
        let records = vec![
            record(3, "node", 8080, Protocol::Tcp, "alice"),
            record(1, "nginx", 80, Protocol::Tcp, "alice"),
            record(2, "dnsmasq", 53, Protocol::Udp, "root"),
            record(4, "Node", 3000, Protocol::Tcp, "alice"),
        ];
        let before = records.clone();
        let filters = FilterCriteria {
            protocol: ProtocolFilter::Tcp,
            user: UserFilter::CurrentUser,
            port_range: Some(PortRange { start: 80, end: 9000 }),
            ..FilterCriteria::default()
        };
        let sort = SortSpec {
            column: SortColumn::Process,
            direction: SortDirection::Descending,
        };

        let first = derive_indices(&records, "n", &filters, sort);
        let second = derive_indices(&records, "n", &filters, sort);
        assert_eq!(first, second);
        assert_eq!(first, vec![0, 3, 1]);
        assert_eq!(records, before);
    }

    #[test]
    fn empty_input_yields_empty_view() {
        let filters = FilterCriteria {
            user: UserFilter::CurrentUser,
            port_range: Some(PortRange { start: 1, end: 2 }),
            ..FilterCriteria::default()
        };
        assert!(derive_indices(&[], "x", &filters, SortSpec::default()).is_empty());
    }
}
