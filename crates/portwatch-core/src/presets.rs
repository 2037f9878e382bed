use crate::{PortPreset, PortRange};

struct PresetDef {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    ports: &'static [u16],
    ranges: &'static [(u16, u16)],
}

const BUILTIN: &[PresetDef] = &[
    PresetDef {
        id: "web",
        name: "Web Services",
        description: "Common web server ports (HTTP, HTTPS, proxies)",
        ports: &[80, 443, 8080, 8443, 3000, 3001, 4000, 5000, 5173, 8000, 8888, 9000],
        ranges: &[],
    },
    PresetDef {
        id: "database",
        name: "Databases",
        description: "MySQL, PostgreSQL, MongoDB, Redis, Elasticsearch and friends",
        ports: &[3306, 5432, 27017, 6379, 9200, 5984, 8529, 7474, 1433, 1521],
        ranges: &[],
    },
    PresetDef {
        id: "dev",
        name: "Development",
        description: "Dev server blocks plus Vite and Tauri defaults",
        ports: &[1420, 5173, 5174, 24678],
        ranges: &[(3000, 3010), (4000, 4010), (5000, 5010), (8000, 8010)],
    },
    PresetDef {
        id: "system",
        name: "System Services",
        description: "Well-known ports (1-1024)",
        ports: &[],
        ranges: &[(1, 1024)],
    },
    PresetDef {
        id: "high",
        name: "High Ports",
        description: "User-space ports (1024-65535)",
        ports: &[],
        ranges: &[(1024, 65535)],
    },
    PresetDef {
        id: "messaging",
        name: "Messaging & Queues",
        description: "RabbitMQ, Kafka, ZooKeeper, NATS, Pulsar, ActiveMQ",
        ports: &[5672, 15672, 9092, 2181, 4222, 6650, 61613, 61616],
        ranges: &[],
    },
    PresetDef {
        id: "container",
        name: "Containers & Orchestration",
        description: "Docker daemon, Kubernetes control plane, etcd",
        ports: &[2375, 2376, 6443, 10250, 10251, 10252, 2379, 2380, 8001],
        ranges: &[],
    },
    PresetDef {
        id: "network",
        name: "Network Services",
        description: "SSH, DNS, DHCP, NTP, SNMP, LDAP, OpenVPN",
        ports: &[22, 53, 67, 68, 123, 161, 162, 389, 636, 1194],
        ranges: &[],
    },
];

pub fn builtin_presets() -> Vec<PortPreset> {
    BUILTIN
        .iter()
        .map(|def| PortPreset {
            id: def.id.to_string(),
            name: def.name.to_string(),
            description: Some(def.description.to_string()),
            ports: def.ports.to_vec(),
            ranges: def
                .ranges
                .iter()
                .map(|&(start, end)| PortRange { start, end })
                .collect(),
        })
        .collect()
}

/// Ranges to scan for a preset: each declared range, then one range spanning
/// the lowest to highest explicitly listed port.
pub fn preset_scan_ranges(preset: &PortPreset) -> Vec<PortRange> {
    let mut ranges = preset.ranges.clone();
    let low = preset.ports.iter().copied().filter(|port| *port > 0).min();
    let high = preset.ports.iter().copied().max();
    if let (Some(start), Some(end)) = (low, high) {
        ranges.push(PortRange { start, end });
    }
    ranges
}

/// Presets fetched from the backend, kept for the life of the session.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: Vec<PortPreset>,
}

impl PresetCatalog {
    pub fn needs_load(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn replace(&mut self, presets: Vec<PortPreset>) {
        self.presets = presets;
    }

    pub fn find(&self, id: &str) -> Option<&PortPreset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn get(&self, idx: usize) -> Option<&PortPreset> {
        self.presets.get(idx)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortPreset> {
        self.presets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        let presets = builtin_presets();
        assert_eq!(presets.len(), 8);
        let mut ids: Vec<&str> = presets.iter().map(|preset| preset.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn scan_ranges_cover_declared_ranges_and_listed_port_span() {
        let presets = builtin_presets();
        let dev = presets
            .iter()
            .find(|preset| preset.id == "dev")
            .expect("dev preset");
        let ranges = preset_scan_ranges(dev);
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[0], PortRange { start: 3000, end: 3010 });
        assert_eq!(
            ranges[4],
            PortRange {
                start: 1420,
                end: 24678
            }
        );

        let system = presets
            .iter()
            .find(|preset| preset.id == "system")
            .expect("system preset");
        assert_eq!(preset_scan_ranges(system), vec![PortRange { start: 1, end: 1024 }]);
    }

    #[test]
    fn every_builtin_range_is_valid() {
        for preset in builtin_presets() {
            for range in preset_scan_ranges(&preset) {
                assert!(
                    PortRange::new(range.start.into(), range.end.into()).is_ok(),
                    "{} produced {range}",
                    preset.id
                );
            }
        }
    }

    #[test]
    fn catalog_loads_once() {
        let mut catalog = PresetCatalog::default();
        assert!(catalog.needs_load());
        catalog.replace(builtin_presets());
        assert!(!catalog.needs_load());
        assert_eq!(catalog.find("web").map(|preset| preset.ports[0]), Some(80));
        assert!(catalog.find("nope").is_none());
    }
}
