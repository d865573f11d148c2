//! Closed set of CSAFE command tokens understood by the protocol codec.
//!
//! A [`CsafeCommand`] pairs a [`CsafeToken`] with the numeric arguments the
//! token carries on the wire.  The codec answers with a [`ResponseMap`] keyed
//! by the same tokens; the device status word is always reported under
//! [`CsafeToken::GetStatus`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Every command the session may place in a frame.
///
/// Serialised with the canonical `CSAFE_*` names so logs and loopback frames
/// read the same as the protocol tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CsafeToken {
    #[serde(rename = "CSAFE_GETSTATUS_CMD")]
    GetStatus,
    #[serde(rename = "CSAFE_RESET_CMD")]
    Reset,
    #[serde(rename = "CSAFE_GOINUSE_CMD")]
    GoInUse,
    #[serde(rename = "CSAFE_GETID_CMD")]
    GetId,
    #[serde(rename = "CSAFE_GETVERSION_CMD")]
    GetVersion,
    #[serde(rename = "CSAFE_GETSERIAL_CMD")]
    GetSerial,
    #[serde(rename = "CSAFE_GETCAPS_CMD")]
    GetCaps,
    #[serde(rename = "CSAFE_GETCADENCE_CMD")]
    GetCadence,
    #[serde(rename = "CSAFE_GETPOWER_CMD")]
    GetPower,
    #[serde(rename = "CSAFE_GETCALORIES_CMD")]
    GetCalories,
    #[serde(rename = "CSAFE_GETHRCUR_CMD")]
    GetHrCur,
    #[serde(rename = "CSAFE_SETTIME_CMD")]
    SetTime,
    #[serde(rename = "CSAFE_SETDATE_CMD")]
    SetDate,
    #[serde(rename = "CSAFE_SETTWORK_CMD")]
    SetTWork,
    #[serde(rename = "CSAFE_SETHORIZONTAL_CMD")]
    SetHorizontal,
    #[serde(rename = "CSAFE_SETPOWER_CMD")]
    SetPower,
    #[serde(rename = "CSAFE_SETPROGRAM_CMD")]
    SetProgram,
    #[serde(rename = "CSAFE_PM_GET_WORKTIME")]
    GetWorkTime,
    #[serde(rename = "CSAFE_PM_GET_WORKDISTANCE")]
    GetWorkDistance,
    #[serde(rename = "CSAFE_PM_GET_FORCEPLOTDATA")]
    GetForcePlotData,
    #[serde(rename = "CSAFE_PM_GET_STROKESTATE")]
    GetStrokeState,
    #[serde(rename = "CSAFE_PM_GET_WORKOUTTYPE")]
    GetWorkoutType,
    #[serde(rename = "CSAFE_PM_GET_WORKOUTSTATE")]
    GetWorkoutState,
    #[serde(rename = "CSAFE_PM_GET_INTERVALTYPE")]
    GetIntervalType,
    #[serde(rename = "CSAFE_PM_GET_WORKOUTINTERVALCOUNT")]
    GetWorkoutIntervalCount,
    #[serde(rename = "CSAFE_PM_SET_SPLITDURATION")]
    SetSplitDuration,
}

impl CsafeToken {
    /// Canonical protocol name, e.g. `"CSAFE_PM_GET_WORKTIME"`.
    pub fn name(self) -> &'static str {
        match self {
            CsafeToken::GetStatus => "CSAFE_GETSTATUS_CMD",
            CsafeToken::Reset => "CSAFE_RESET_CMD",
            CsafeToken::GoInUse => "CSAFE_GOINUSE_CMD",
            CsafeToken::GetId => "CSAFE_GETID_CMD",
            CsafeToken::GetVersion => "CSAFE_GETVERSION_CMD",
            CsafeToken::GetSerial => "CSAFE_GETSERIAL_CMD",
            CsafeToken::GetCaps => "CSAFE_GETCAPS_CMD",
            CsafeToken::GetCadence => "CSAFE_GETCADENCE_CMD",
            CsafeToken::GetPower => "CSAFE_GETPOWER_CMD",
            CsafeToken::GetCalories => "CSAFE_GETCALORIES_CMD",
            CsafeToken::GetHrCur => "CSAFE_GETHRCUR_CMD",
            CsafeToken::SetTime => "CSAFE_SETTIME_CMD",
            CsafeToken::SetDate => "CSAFE_SETDATE_CMD",
            CsafeToken::SetTWork => "CSAFE_SETTWORK_CMD",
            CsafeToken::SetHorizontal => "CSAFE_SETHORIZONTAL_CMD",
            CsafeToken::SetPower => "CSAFE_SETPOWER_CMD",
            CsafeToken::SetProgram => "CSAFE_SETPROGRAM_CMD",
            CsafeToken::GetWorkTime => "CSAFE_PM_GET_WORKTIME",
            CsafeToken::GetWorkDistance => "CSAFE_PM_GET_WORKDISTANCE",
            CsafeToken::GetForcePlotData => "CSAFE_PM_GET_FORCEPLOTDATA",
            CsafeToken::GetStrokeState => "CSAFE_PM_GET_STROKESTATE",
            CsafeToken::GetWorkoutType => "CSAFE_PM_GET_WORKOUTTYPE",
            CsafeToken::GetWorkoutState => "CSAFE_PM_GET_WORKOUTSTATE",
            CsafeToken::GetIntervalType => "CSAFE_PM_GET_INTERVALTYPE",
            CsafeToken::GetWorkoutIntervalCount => "CSAFE_PM_GET_WORKOUTINTERVALCOUNT",
            CsafeToken::SetSplitDuration => "CSAFE_PM_SET_SPLITDURATION",
        }
    }

    /// Number of numeric arguments this token carries in a request frame.
    pub fn arg_count(self) -> usize {
        match self {
            CsafeToken::GetForcePlotData | CsafeToken::GetCaps => 1,
            CsafeToken::SetHorizontal
            | CsafeToken::SetPower
            | CsafeToken::SetProgram
            | CsafeToken::SetSplitDuration => 2,
            CsafeToken::SetTime | CsafeToken::SetDate | CsafeToken::SetTWork => 3,
            _ => 0,
        }
    }
}

impl fmt::Display for CsafeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One command within a request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsafeCommand {
    pub token: CsafeToken,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<u32>,
}

impl CsafeCommand {
    /// A command without arguments.
    pub fn new(token: CsafeToken) -> Self {
        Self {
            token,
            args: Vec::new(),
        }
    }

    /// A data-carrying command.
    pub fn with_args(token: CsafeToken, args: impl Into<Vec<u32>>) -> Self {
        Self {
            token,
            args: args.into(),
        }
    }

    /// `true` when the argument count matches [`CsafeToken::arg_count`].
    pub fn is_well_formed(&self) -> bool {
        self.args.len() == self.token.arg_count()
    }
}

impl From<CsafeToken> for CsafeCommand {
    fn from(token: CsafeToken) -> Self {
        Self::new(token)
    }
}

/// Decoded response: the raw numeric fields returned for each token.
pub type ResponseMap = BTreeMap<CsafeToken, Vec<u32>>;
