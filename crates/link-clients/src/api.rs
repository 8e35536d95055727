//! # API Ids
//!
//! Numeric API ids understood by each remote service. The id travels in the
//! request header next to the correlation id and is echoed in the response.

/// Sport service (`rt/api/sport/request`).
pub mod sport {
    pub const DAMP: u32 = 1001;
    pub const BALANCE_STAND: u32 = 1002;
    pub const STOP_MOVE: u32 = 1003;
    pub const STAND_UP: u32 = 1004;
    pub const STAND_DOWN: u32 = 1005;
    pub const RECOVERY_STAND: u32 = 1006;
    pub const EULER: u32 = 1007;
    pub const MOVE: u32 = 1008;
    pub const SIT: u32 = 1009;
    pub const RISE_SIT: u32 = 1010;
    pub const SWITCH_GAIT: u32 = 1011;
    pub const TRIGGER: u32 = 1012;
    pub const BODY_HEIGHT: u32 = 1013;
    pub const FOOT_RAISE_HEIGHT: u32 = 1014;
    pub const SPEED_LEVEL: u32 = 1015;
    pub const HELLO: u32 = 1016;
    pub const STRETCH: u32 = 1017;
    pub const TRAJECTORY_FOLLOW: u32 = 1018;
    pub const CONTINUOUS_GAIT: u32 = 1019;
    pub const CONTENT: u32 = 1020;
    pub const WALLOW: u32 = 1021;
    pub const DANCE1: u32 = 1022;
    pub const DANCE2: u32 = 1023;
    pub const GET_BODY_HEIGHT: u32 = 1024;
    pub const GET_FOOT_RAISE_HEIGHT: u32 = 1025;
    pub const GET_SPEED_LEVEL: u32 = 1026;
    pub const SWITCH_JOYSTICK: u32 = 1027;
    pub const POSE: u32 = 1028;
    pub const SCRAPE: u32 = 1029;
    pub const FRONT_FLIP: u32 = 1030;
    pub const FRONT_JUMP: u32 = 1031;
    pub const FRONT_POUNCE: u32 = 1032;
    pub const WIGGLE_HIPS: u32 = 1033;
    pub const GET_STATE: u32 = 1034;
    pub const ECONOMIC_GAIT: u32 = 1035;
    pub const FINGER_HEART: u32 = 1036;
    pub const LEAD_FOLLOW: u32 = 1045;
    pub const HANDSTAND: u32 = 1301;
    pub const CROSS_STEP: u32 = 1302;
    pub const ONESIDED_STEP: u32 = 1303;
    pub const BOUND: u32 = 1304;

    pub(crate) const NAMES: &[(&str, u32)] = &[
        ("Damp", DAMP),
        ("BalanceStand", BALANCE_STAND),
        ("StopMove", STOP_MOVE),
        ("StandUp", STAND_UP),
        ("StandDown", STAND_DOWN),
        ("RecoveryStand", RECOVERY_STAND),
        ("Euler", EULER),
        ("Move", MOVE),
        ("Sit", SIT),
        ("RiseSit", RISE_SIT),
        ("SwitchGait", SWITCH_GAIT),
        ("Trigger", TRIGGER),
        ("BodyHeight", BODY_HEIGHT),
        ("FootRaiseHeight", FOOT_RAISE_HEIGHT),
        ("SpeedLevel", SPEED_LEVEL),
        ("Hello", HELLO),
        ("Stretch", STRETCH),
        ("TrajectoryFollow", TRAJECTORY_FOLLOW),
        ("ContinuousGait", CONTINUOUS_GAIT),
        ("Content", CONTENT),
        ("Wallow", WALLOW),
        ("Dance1", DANCE1),
        ("Dance2", DANCE2),
        ("GetBodyHeight", GET_BODY_HEIGHT),
        ("GetFootRaiseHeight", GET_FOOT_RAISE_HEIGHT),
        ("GetSpeedLevel", GET_SPEED_LEVEL),
        ("SwitchJoystick", SWITCH_JOYSTICK),
        ("Pose", POSE),
        ("Scrape", SCRAPE),
        ("FrontFlip", FRONT_FLIP),
        ("FrontJump", FRONT_JUMP),
        ("FrontPounce", FRONT_POUNCE),
        ("WiggleHips", WIGGLE_HIPS),
        ("GetState", GET_STATE),
        ("EconomicGait", ECONOMIC_GAIT),
        ("FingerHeart", FINGER_HEART),
        ("LeadFollow", LEAD_FOLLOW),
        ("Handstand", HANDSTAND),
        ("CrossStep", CROSS_STEP),
        ("OnesidedStep", ONESIDED_STEP),
        ("Bound", BOUND),
    ];
}

/// Motion switcher service (`rt/api/motion_switcher/request`).
pub mod motion_switcher {
    pub const GET_MODE: u32 = 1001;
    pub const SET_MODE: u32 = 1002;
    pub const RELEASE_MODE: u32 = 1003;
    pub const SET_SILENT: u32 = 1004;
    pub const GET_SILENT: u32 = 1005;

    pub(crate) const NAMES: &[(&str, u32)] = &[
        ("GetMode", GET_MODE),
        ("SetMode", SET_MODE),
        ("ReleaseMode", RELEASE_MODE),
        ("SetSilent", SET_SILENT),
        ("GetSilent", GET_SILENT),
    ];
}

/// Robot state service (`rt/api/robot_state/request`).
pub mod robot_state {
    pub const SERVICE_SWITCH: u32 = 1001;
    pub const SET_REPORT_FREQ: u32 = 1002;
    pub const GET_SERVICE_LIST: u32 = 1003;

    pub(crate) const NAMES: &[(&str, u32)] = &[
        ("ServiceSwitch", SERVICE_SWITCH),
        ("SetReportFreq", SET_REPORT_FREQ),
        ("GetServiceList", GET_SERVICE_LIST),
    ];
}

/// Which service an id table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Sport,
    MotionSwitcher,
    RobotState,
}

impl Service {
    /// Request topic of the service.
    #[must_use]
    pub fn request_topic(self) -> &'static str {
        match self {
            Service::Sport => link_types::topics::SPORT_REQUEST,
            Service::MotionSwitcher => link_types::topics::MOTION_SWITCHER_REQUEST,
            Service::RobotState => link_types::topics::ROBOT_STATE_REQUEST,
        }
    }

    fn table(self) -> &'static [(&'static str, u32)] {
        match self {
            Service::Sport => sport::NAMES,
            Service::MotionSwitcher => motion_switcher::NAMES,
            Service::RobotState => robot_state::NAMES,
        }
    }

    /// Look up an API id by its method name, e.g. `"StandUp"`.
    #[must_use]
    pub fn api_id(self, name: &str) -> Option<u32> {
        self.table().iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
    }

    /// Reverse lookup, used for log output.
    #[must_use]
    pub fn api_name(self, api_id: u32) -> Option<&'static str> {
        self.table()
            .iter()
            .find(|(_, id)| *id == api_id)
            .map(|(n, _)| *n)
    }
}
