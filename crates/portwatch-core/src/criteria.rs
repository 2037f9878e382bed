use crate::{PortRange, Protocol};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFilter {
    #[default]
    All,
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    #[default]
    All,
    Listening,
    Established,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFilter {
    #[default]
    All,
    CurrentUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub protocol: ProtocolFilter,
    #[serde(default)]
    pub state: StateFilter,
    #[serde(default)]
    pub user: UserFilter,
    #[serde(default)]
    pub port_range: Option<PortRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortColumn {
    #[default]
    Port,
    Process,
    Pid,
    Protocol,
    Address,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "asc")]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl ProtocolFilter {
    pub fn label(self) -> &'static str {
        match self {
            ProtocolFilter::All => "all",
            ProtocolFilter::Tcp => "tcp",
            ProtocolFilter::Udp => "udp",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ProtocolFilter::All => ProtocolFilter::Tcp,
            ProtocolFilter::Tcp => ProtocolFilter::Udp,
            ProtocolFilter::Udp => ProtocolFilter::All,
        }
    }

    pub fn selected(self) -> Option<Protocol> {
        match self {
            ProtocolFilter::All => None,
            ProtocolFilter::Tcp => Some(Protocol::Tcp),
            ProtocolFilter::Udp => Some(Protocol::Udp),
        }
    }
}

impl FromStr for ProtocolFilter {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(ProtocolFilter::All),
            "tcp" => Ok(ProtocolFilter::Tcp),
            "udp" => Ok(ProtocolFilter::Udp),
            other => Err(format!("Unknown protocol filter: {other}")),
        }
    }
}

impl StateFilter {
    pub fn label(self) -> &'static str {
        match self {
            StateFilter::All => "all",
            StateFilter::Listening => "listening",
            StateFilter::Established => "established",
        }
    }

    pub fn next(self) -> Self {
        match self {
            StateFilter::All => StateFilter::Listening,
            StateFilter::Listening => StateFilter::Established,
            StateFilter::Established => StateFilter::All,
        }
    }
}

impl UserFilter {
    pub fn label(self) -> &'static str {
        match self {
            UserFilter::All => "all",
            UserFilter::CurrentUser => "current",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            UserFilter::All => UserFilter::CurrentUser,
            UserFilter::CurrentUser => UserFilter::All,
        }
    }
}

impl FilterCriteria {
    /// Number of fields that restrict the view.
    pub fn active_count(&self) -> usize {
        [
            self.protocol != ProtocolFilter::All,
            self.state != StateFilter::All,
            self.user != UserFilter::All,
            self.port_range.is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }
}

impl SortColumn {
    pub const ALL: [SortColumn; 6] = [
        SortColumn::Port,
        SortColumn::Process,
        SortColumn::Pid,
        SortColumn::Protocol,
        SortColumn::Address,
        SortColumn::User,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortColumn::Port => "port",
            SortColumn::Process => "process",
            SortColumn::Pid => "pid",
            SortColumn::Protocol => "protocol",
            SortColumn::Address => "address",
            SortColumn::User => "user",
        }
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase();
        SortColumn::ALL
            .into_iter()
            .find(|column| column.label() == normalized)
            .ok_or_else(|| format!("Unknown sort column: {normalized}"))
    }
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Search text, filters and sort, each with a revision counter so the
/// derivation cache can tell whether anything it depends on moved.
#[derive(Debug, Clone, Default)]
pub struct CriteriaStore {
    search: String,
    filters: FilterCriteria,
    sort: SortSpec,
    revision: u64,
}

impl CriteriaStore {
    pub fn new(sort: SortSpec) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn filters(&self) -> &FilterCriteria {
        &self.filters
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_search(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.search == text {
            return false;
        }
        self.search = text;
        self.bump()
    }

    pub fn set_filters(&mut self, filters: FilterCriteria) -> bool {
        if self.filters == filters {
            return false;
        }
        self.filters = filters;
        self.bump()
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> bool {
        if self.sort == sort {
            return false;
        }
        self.sort = sort;
        self.bump()
    }

    /// Same column flips direction; another column starts ascending.
    pub fn toggle_sort(&mut self, column: SortColumn) -> bool {
        let next = if self.sort.column == column {
            SortSpec {
                column,
                direction: self.sort.direction.flip(),
            }
        } else {
            SortSpec {
                column,
                direction: SortDirection::Ascending,
            }
        };
        self.set_sort(next)
    }

    /// Clears search and filters. Sort is left alone.
    pub fn reset(&mut self) -> bool {
        let search_changed = self.set_search(String::new());
        let filters_changed = self.set_filters(FilterCriteria::default());
        search_changed || filters_changed
    }

    pub fn reset_sort(&mut self) -> bool {
        self.set_sort(SortSpec::default())
    }

    fn bump(&mut self) -> bool {
        self.revision = self.revision.wrapping_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_keeps_sort_and_reset_sort_keeps_filters() {
        let mut store = CriteriaStore::default();
        store.set_search("nginx");
        store.set_filters(FilterCriteria {
            protocol: ProtocolFilter::Udp,
            ..FilterCriteria::default()
        });
        store.set_sort(SortSpec {
            column: SortColumn::User,
            direction: SortDirection::Descending,
        });

        assert!(store.reset());
        assert_eq!(store.search(), "");
        assert_eq!(*store.filters(), FilterCriteria::default());
        assert_eq!(store.sort().column, SortColumn::User);

        store.set_filters(FilterCriteria {
            user: UserFilter::CurrentUser,
            ..FilterCriteria::default()
        });
        assert!(store.reset_sort());
        assert_eq!(store.sort(), SortSpec::default());
        assert_eq!(store.filters().user, UserFilter::CurrentUser);
    }

    #[test]
    fn revision_moves_only_on_real_changes() {
        let mut store = CriteriaStore::default();
        let start = store.revision();
        assert!(!store.set_search(""));
        assert!(!store.reset());
        assert_eq!(store.revision(), start);

        assert!(store.set_search("80"));
        assert_eq!(store.revision(), start + 1);
    }

    #[test]
    fn toggle_sort_flips_same_column_and_resets_direction_on_new_column() {
        let mut store = CriteriaStore::default();
        store.toggle_sort(SortColumn::Port);
        assert_eq!(store.sort().direction, SortDirection::Descending);
        store.toggle_sort(SortColumn::Pid);
        assert_eq!(
            store.sort(),
            SortSpec {
                column: SortColumn::Pid,
                direction: SortDirection::Ascending
            }
        );
    }

    #[test]
    fn active_count_tracks_restrictions() {
        let criteria = FilterCriteria {
            protocol: ProtocolFilter::Tcp,
            port_range: Some(PortRange { start: 1, end: 10 }),
            ..FilterCriteria::default()
        };
        assert_eq!(criteria.active_count(), 2);
        assert_eq!(FilterCriteria::default().active_count(), 0);
    }

    #[test]
    fn sort_direction_accepts_short_aliases() {
        let parsed: SortDirection = serde_json::from_str("\"desc\"").expect("alias");
        assert_eq!(parsed, SortDirection::Descending);
        assert_eq!("Address".parse::<SortColumn>(), Ok(SortColumn::Address));
    }
}
