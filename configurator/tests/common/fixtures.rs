//! Test fixtures and data for configurator tests
//!
//! Standard cluster layouts and the paths written by default settings.

use std::net::IpAddr;

use configurator::BootstrapSettings;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const MASTER_ALIAS: &'static str = "master";
    pub const MASTER_ADDRESS: &'static str = "10.0.0.1";
    pub const MASTER_DNS: &'static str = "ec2-54-210-1-1.compute-1.amazonaws.com";
    pub const MASTER_GROUP: &'static str = "INPUT";

    pub const MONITOR_URL: &'static str = "http://ec2-54-210-1-1.compute-1.amazonaws.com:50095";

    /// `count` workers named node001.. with addresses 10.0.0.2..
    pub fn workers(count: usize) -> Vec<(String, IpAddr)> {
        (1..=count)
            .map(|i| (format!("node{i:03}"), format!("10.0.0.{}", i + 1).parse().unwrap()))
            .collect()
    }

    pub fn master_address() -> IpAddr {
        Self::MASTER_ADDRESS.parse().unwrap()
    }

    pub fn settings() -> BootstrapSettings {
        BootstrapSettings::default()
    }

    pub fn env_path() -> String {
        Self::settings().env_file_path()
    }

    pub fn site_path() -> String {
        Self::settings().site_file_path()
    }

    pub fn masters_path() -> String {
        Self::settings().masters_file_path()
    }

    pub fn workers_path() -> String {
        Self::settings().workers_file_path()
    }

    pub fn zoo_cfg_path() -> String {
        Self::settings().zoo_cfg_path()
    }
}
