//! Lifecycle context data remapping.

use crate::Traits;
use std::collections::BTreeMap;

/// Lifecycle metric keys and the trait names they are submitted under.
pub const LIFECYCLE_KEY_MAP: &[(&str, &str)] = &[
    ("advertisingidentifier", "a.adid"),
    ("appid", "a.AppID"),
    ("carriername", "a.CarrierName"),
    ("crashevent", "a.CrashEvent"),
    ("dailyenguserevent", "a.DailyEngUserEvent"),
    ("dayofweek", "a.DayOfWeek"),
    ("dayssincefirstuse", "a.DaysSinceFirstUse"),
    ("dayssincelastuse", "a.DaysSinceLastUse"),
    ("dayssincelastupgrade", "a.DaysSinceLastUpgrade"),
    ("devicename", "a.DeviceName"),
    ("resolution", "a.Resolution"),
    ("hourofday", "a.HourOfDay"),
    ("ignoredsessionlength", "a.ignoredSessionLength"),
    ("installdate", "a.InstallDate"),
    ("installevent", "a.InstallEvent"),
    ("launchevent", "a.LaunchEvent"),
    ("launches", "a.Launches"),
    ("launchessinceupgrade", "a.LaunchesSinceUpgrade"),
    ("locale", "a.locale"),
    ("monthlyenguserevent", "a.MonthlyEngUserEvent"),
    ("osversion", "a.OSVersion"),
    ("prevsessionlength", "a.PrevSessionLength"),
    ("runmode", "a.RunMode"),
    ("upgradeevent", "a.UpgradeEvent"),
];

/// Convert lifecycle context data into signal traits.
///
/// Known keys are renamed, unknown keys pass through, empty values are
/// dropped.
pub fn remap_lifecycle_data(context_data: &BTreeMap<String, String>) -> Traits {
    context_data
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| {
            let mapped = LIFECYCLE_KEY_MAP
                .iter()
                .find(|(from, _)| *from == key.as_str())
                .map(|(_, to)| (*to).to_string())
                .unwrap_or_else(|| key.clone());
            (mapped, value.clone())
        })
        .collect()
}
