//! Board services backed by std: wall clock, thread sleep and `rand`

use std::ops::Range;
use std::time::{Duration, Instant};

use cornhole_node::{bounded, Platform, Text};
use log::info;
use rand::Rng;

pub struct HostPlatform {
    name: String,
    started: Instant,
    wifi: bool,
    battery_raw: u16,
    restarts: u32,
    updates: bool,
}

impl HostPlatform {
    pub fn new(name: &str, battery_raw: u16) -> Self {
        Self {
            name: name.to_string(),
            started: Instant::now(),
            wifi: true,
            battery_raw: battery_raw.min(4095),
            restarts: 0,
            updates: false,
        }
    }

    /// Number of reboots requested so far
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn wifi_enabled(&self) -> bool {
        self.wifi
    }

    pub fn updates_started(&self) -> bool {
        self.updates
    }
}

impl Platform for HostPlatform {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms.into()));
    }

    fn random_range(&mut self, range: Range<u32>) -> u32 {
        if range.is_empty() {
            return range.start;
        }
        rand::thread_rng().gen_range(range)
    }

    fn restart(&mut self) {
        self.restarts += 1;
        info!("{}: rebooting", self.name);
    }

    fn begin_updates(&mut self) {
        if !self.updates {
            self.updates = true;
            info!("{}: update service started", self.name);
        }
    }

    fn set_wifi(&mut self, enabled: bool) {
        if self.wifi != enabled {
            info!("{}: wifi {}", self.name, if enabled { "on" } else { "off" });
        }
        self.wifi = enabled;
    }

    fn ip_address(&self) -> Text<16> {
        bounded(if self.wifi { "127.0.0.1" } else { "0.0.0.0" })
    }

    fn battery_raw(&mut self) -> u16 {
        self.battery_raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_range_stays_in_bounds() {
        let mut platform = HostPlatform::new("left", 3900);
        for _ in 0..100 {
            let v = platform.random_range(300..2000);
            assert!((300..2000).contains(&v));
        }
        assert_eq!(platform.random_range(5..5), 5);
    }

    #[test]
    fn test_ip_follows_wifi() {
        let mut platform = HostPlatform::new("left", 3900);
        assert_eq!(platform.ip_address().as_str(), "127.0.0.1");
        platform.set_wifi(false);
        assert_eq!(platform.ip_address().as_str(), "0.0.0.0");
        assert!(!platform.wifi_enabled());
    }

    #[test]
    fn test_clock_advances_with_delay() {
        let mut platform = HostPlatform::new("left", 5000);
        assert_eq!(platform.battery_raw(), 4095);
        let before = platform.now_ms();
        platform.delay_ms(5);
        assert!(platform.now_ms() >= before + 5);
        platform.restart();
        assert_eq!(platform.restarts(), 1);
    }
}
