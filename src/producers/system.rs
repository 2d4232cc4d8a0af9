//! Host metrics from `sysinfo`.

use super::SensorProducer;
use crate::sensor::{DeviceClass, EntityCategory, SensorUpdate, StateClass};
use chrono::{TimeZone, Utc};
use serde_json::json;
use sysinfo::{ProcessRefreshKind, System, Uid, UpdateKind, Users};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Memory and swap usage.
pub struct MemoryProducer {
    system: System,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProducer for MemoryProducer {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn sample(&mut self) -> Vec<SensorUpdate> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        let available = self.system.available_memory();
        let used = self.system.used_memory();

        let mut updates = vec![
            SensorUpdate::new("memory_usage", "Memory Usage", percent(used, total))
                .units("%")
                .icon("mdi:memory")
                .state_class(StateClass::Measurement),
            SensorUpdate::new("memory_total", "Memory Total", round2(total as f64 / BYTES_PER_MIB))
                .units("MiB")
                .icon("mdi:memory")
                .device_class(DeviceClass::DataSize)
                .category(EntityCategory::Diagnostic),
            SensorUpdate::new(
                "memory_available",
                "Memory Available",
                round2(available as f64 / BYTES_PER_MIB),
            )
            .units("MiB")
            .icon("mdi:memory")
            .device_class(DeviceClass::DataSize)
            .state_class(StateClass::Measurement),
        ];

        let swap_total = self.system.total_swap();
        if swap_total > 0 {
            updates.push(
                SensorUpdate::new(
                    "swap_usage",
                    "Swap Usage",
                    percent(self.system.used_swap(), swap_total),
                )
                .units("%")
                .icon("mdi:harddisk")
                .state_class(StateClass::Measurement),
            );
        }

        updates
    }
}

/// 1, 5 and 15 minute load averages.
pub struct LoadProducer;

impl SensorProducer for LoadProducer {
    fn name(&self) -> &'static str {
        "load"
    }

    fn sample(&mut self) -> Vec<SensorUpdate> {
        let load = System::load_average();
        [
            ("load_1", "CPU Load Average (1 min)", load.one),
            ("load_5", "CPU Load Average (5 min)", load.five),
            ("load_15", "CPU Load Average (15 min)", load.fifteen),
        ]
        .into_iter()
        .map(|(id, name, value)| {
            SensorUpdate::new(id, name, round2(value))
                .icon("mdi:chip")
                .state_class(StateClass::Measurement)
        })
        .collect()
    }
}

/// Uptime and boot time.
pub struct UptimeProducer;

impl SensorProducer for UptimeProducer {
    fn name(&self) -> &'static str {
        "uptime"
    }

    fn sample(&mut self) -> Vec<SensorUpdate> {
        let hours = round2(System::uptime() as f64 / 3600.0);
        let mut updates = vec![SensorUpdate::new("uptime", "Uptime", hours)
            .units("h")
            .icon("mdi:restart")
            .device_class(DeviceClass::Duration)
            .state_class(StateClass::TotalIncreasing)
            .category(EntityCategory::Diagnostic)];

        match Utc.timestamp_opt(System::boot_time() as i64, 0).single() {
            Some(boot) => updates.push(
                SensorUpdate::new("boot_time", "Last Reboot", boot.to_rfc3339())
                    .icon("mdi:restart")
                    .device_class(DeviceClass::Timestamp)
                    .category(EntityCategory::Diagnostic),
            ),
            None => tracing::debug!("Boot time out of range, skipping"),
        }

        updates
    }
}

// Accounts below this uid belong to the system on unix hosts.
#[cfg(unix)]
const FIRST_LOGIN_UID: u32 = 1000;

#[cfg(unix)]
fn is_login_account(uid: &Uid) -> bool {
    **uid >= FIRST_LOGIN_UID
}

#[cfg(not(unix))]
fn is_login_account(_uid: &Uid) -> bool {
    true
}

/// Sorted names of the `accounts` that own at least one of `owners`.
fn active_names<'a, U: PartialEq + 'a>(
    accounts: impl IntoIterator<Item = (&'a U, &'a str)>,
    owners: &[&U],
) -> Vec<String> {
    let mut names: Vec<String> = accounts
        .into_iter()
        .filter(|(id, _)| owners.contains(id))
        .map(|(_, name)| name.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Users with a running process.
pub struct UsersProducer {
    system: System,
    users: Users,
}

impl UsersProducer {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new(),
        }
    }
}

impl Default for UsersProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProducer for UsersProducer {
    fn name(&self) -> &'static str {
        "users"
    }

    fn sample(&mut self) -> Vec<SensorUpdate> {
        self.system.refresh_processes_specifics(
            ProcessRefreshKind::new().with_user(UpdateKind::OnlyIfNotSet),
        );
        self.users.refresh_list();

        let owners: Vec<&Uid> = self
            .system
            .processes()
            .values()
            .filter_map(|process| process.user_id())
            .filter(|uid| is_login_account(uid))
            .collect();
        let names = active_names(
            self.users.list().iter().map(|user| (user.id(), user.name())),
            &owners,
        );

        vec![SensorUpdate::new("users", "Current Users", names.len() as i64)
            .units("users")
            .icon("mdi:account")
            .state_class(StateClass::Measurement)
            .attributes(json!({
                "Data Source": "sysinfo",
                "Usernames": names,
            }))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorValue;

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), 25.0);
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(5, 0), 0.0);
    }

    #[test]
    fn test_memory_sample_ids() {
        let updates = MemoryProducer::new().sample();
        let ids: Vec<_> = updates.iter().map(|u| u.id.as_str()).collect();
        assert!(ids.starts_with(&["memory_usage", "memory_total", "memory_available"]));
    }

    #[test]
    fn test_load_sample_ids() {
        let updates = LoadProducer.sample();
        let ids: Vec<_> = updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["load_1", "load_5", "load_15"]);
    }

    #[test]
    fn test_uptime_sample() {
        let updates = UptimeProducer.sample();
        assert_eq!(updates[0].id, "uptime");
        assert_eq!(updates[0].units.as_deref(), Some("h"));
    }

    #[test]
    fn test_active_names_only_counts_owners() {
        let accounts = [(1000u32, "alice"), (1001, "bob"), (1002, "carol")];
        let owners = [&1002u32, &1000, &1000, &4242];

        let names = active_names(accounts.iter().map(|(id, name)| (id, *name)), &owners);
        assert_eq!(names, vec!["alice", "carol"]);

        let none = active_names(accounts.iter().map(|(id, name)| (id, *name)), &[]);
        assert!(none.is_empty());
    }

    #[test]
    fn test_users_sample() {
        let updates = UsersProducer::new().sample();
        assert_eq!(updates.len(), 1);

        let users = &updates[0];
        assert_eq!(users.id, "users");
        assert_eq!(users.units.as_deref(), Some("users"));
        let attributes = users.attributes.as_ref().unwrap();
        assert_eq!(attributes["Data Source"], "sysinfo");
        let listed = attributes["Usernames"].as_array().unwrap().len() as i64;
        assert_eq!(users.value, SensorValue::Int(listed));
    }
}
