//! # Topics
//!
//! Topic names for the actuator's services and the request → response
//! derivation rule. The derivation is an exact substitution of the trailing
//! `/request` token; nothing else in the link does addressing.

/// Trailing token of every request topic.
pub const REQUEST_SUFFIX: &str = "/request";
/// Trailing token of every response topic.
pub const RESPONSE_SUFFIX: &str = "/response";

pub const SPORT_REQUEST: &str = "rt/api/sport/request";
pub const MOTION_SWITCHER_REQUEST: &str = "rt/api/motion_switcher/request";
pub const ROBOT_STATE_REQUEST: &str = "rt/api/robot_state/request";

pub const LOW_CMD: &str = "rt/lowcmd";
pub const LOW_STATE: &str = "rt/lowstate";
pub const LOW_STATE_LF: &str = "rt/lf/lowstate";
pub const SERVICE_STATE: &str = "rt/servicestate";
pub const SPORT_MODE_STATE: &str = "rt/sportmodestate";
pub const SPORT_MODE_STATE_MF: &str = "rt/mf/sportmodestate";
pub const SPORT_MODE_STATE_LF: &str = "rt/lf/sportmodestate";

/// Short name → topic, for services and streams the runtime knows about.
const NAMED: &[(&str, &str)] = &[
    ("SPORT_MOD", SPORT_REQUEST),
    ("MOTION_SWITCHER", MOTION_SWITCHER_REQUEST),
    ("ROBOT_STATE", ROBOT_STATE_REQUEST),
    ("VIDEOHUB", "rt/api/videohub/request"),
    ("UWBSWITCH", "rt/api/uwbswitch/request"),
    ("BASHRUNNER", "rt/api/bashrunner/request"),
    ("OBSTACLES_AVOID", "rt/api/obstacles_avoid/request"),
    ("VUI", "rt/api/vui/request"),
    ("GPT", "rt/api/gpt/request"),
    ("AUDIOHUB", "rt/api/audiohub/request"),
    ("CONFIG", "rt/api/config/request"),
    ("GAS_SENSOR", "rt/api/gas_sensor/request"),
    ("LOW_CMD", LOW_CMD),
    ("LOW_STATE", LOW_STATE),
    ("LF_LOW_STATE", LOW_STATE_LF),
    ("SERVICE_STATE", SERVICE_STATE),
    ("SPORT_MODE_STATE", SPORT_MODE_STATE),
    ("MF_SPORT_MODE_STATE", SPORT_MODE_STATE_MF),
    ("LF_SPORT_MODE_STATE", SPORT_MODE_STATE_LF),
];

/// Derive the paired response topic.
///
/// Returns `None` unless `request_topic` ends with `/request`. Only the
/// trailing token is replaced, so `a/request/b/request` maps to
/// `a/request/b/response`.
pub fn response_topic_for(request_topic: &str) -> Option<String> {
    request_topic
        .strip_suffix(REQUEST_SUFFIX)
        .map(|base| format!("{base}{RESPONSE_SUFFIX}"))
}

/// Resolve a short service name (e.g. `SPORT_MOD`) to its topic.
pub fn lookup(name: &str) -> Option<&'static str> {
    NAMED.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
}
