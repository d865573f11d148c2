//! Label tables for enumerated monitor fields.

use rowlink_types::{FieldValue, Reading};

const STROKE_STATE: &[&str] = &[
    "Wait for min speed",
    "Wait for acceleration",
    "Drive",
    "Dwelling",
    "Recovery",
];

const WORKOUT_TYPE: &[&str] = &[
    "Just Row / no splits",
    "Just Row / splits",
    "Fixed Distance / splits",
    "Fixed Distance / no splits",
    "Fixed Time / no splits",
    "Fixed Time Interval",
    "Fixed Distance Interval",
    "Variable Interval",
];

const WORKOUT_STATE: &[&str] = &[
    "Waiting begin",
    "Workout row",
    "Countdown pause",
    "Interval rest",
    "Work time interval",
    "Work distance interval",
    "Rest end time",
    "Rest end distance",
    "Time end rest",
    "Distance end rest",
    "Workout end",
    "Workout terminate",
    "Workout logged",
    "Workout rearm",
];

const INTERVAL_TYPE: &[&str] = &["Time", "Distance", "Rest"];

const DISPLAY_TYPE: &[&str] = &[
    "Standard",
    "Force/Velocity",
    "Paceboat",
    "Per Stroke",
    "Simple",
    "Target",
];

const DISPLAY_UNITS_TYPE: &[&str] = &["Time/Meters", "Pace", "Watts", "Calories"];

const STATUS: &[&str] = &[
    "Error", "Ready", "Idle", "Have ID", "N/A", "In Use", "Pause", "Finished", "Manual", "Offline",
];

fn table_for(key: &str) -> Option<&'static [&'static str]> {
    match key {
        "strokestate" => Some(STROKE_STATE),
        "workouttype" => Some(WORKOUT_TYPE),
        "workoutstate" => Some(WORKOUT_STATE),
        "inttype" => Some(INTERVAL_TYPE),
        "displaytype" => Some(DISPLAY_TYPE),
        "displayunitstype" => Some(DISPLAY_UNITS_TYPE),
        "status" => Some(STATUS),
        _ => None,
    }
}

/// Label for `code` under field `key`, or `None` when the key has no table
/// or the code is out of range.
pub fn label_for(key: &str, code: i64) -> Option<&'static str> {
    let table = table_for(key)?;
    usize::try_from(code).ok().and_then(|i| table.get(i)).copied()
}

/// Replace every known enumerated code in `reading` with its label.
///
/// Unknown codes (monitors report e.g. `inttype` 255) keep their numeric
/// value.  Does nothing when `enabled` is false.
pub fn prettify(reading: &mut Reading, enabled: bool) {
    if !enabled {
        return;
    }
    for (key, value) in reading.iter_mut() {
        if let Some(label) = value.as_i64().and_then(|code| label_for(key, code)) {
            *value = FieldValue::Label(label.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_become_labels() {
        let mut reading = Reading::new();
        reading.insert("status", 5u32);
        reading.insert("strokestate", 2u32);
        reading.insert("inttype", 1u32);
        prettify(&mut reading, true);
        assert_eq!(reading.label("status"), Some("In Use"));
        assert_eq!(reading.label("strokestate"), Some("Drive"));
        assert_eq!(reading.label("inttype"), Some("Distance"));
    }

    #[test]
    fn out_of_range_codes_are_kept() {
        let mut reading = Reading::new();
        reading.insert("status", 999u32);
        reading.insert("inttype", 255u32);
        reading.insert("workoutstate", -1i64);
        prettify(&mut reading, true);
        assert_eq!(reading.int("status"), Some(999));
        assert_eq!(reading.int("inttype"), Some(255));
        assert_eq!(reading.int("workoutstate"), Some(-1));
    }

    #[test]
    fn untabled_fields_and_disabled_flag_are_untouched() {
        let mut reading = Reading::new();
        reading.insert("spm", 1u32);
        reading.insert("status", 1u32);
        prettify(&mut reading, false);
        assert_eq!(reading.int("status"), Some(1));
        prettify(&mut reading, true);
        assert_eq!(reading.int("spm"), Some(1));
        assert_eq!(reading.label("status"), Some("Ready"));
    }

    #[test]
    fn table_edges() {
        assert_eq!(label_for("status", 0), Some("Error"));
        assert_eq!(label_for("status", 9), Some("Offline"));
        assert_eq!(label_for("status", 10), None);
        assert_eq!(label_for("workouttype", 7), Some("Variable Interval"));
        assert_eq!(label_for("displayunitstype", 3), Some("Calories"));
        assert_eq!(label_for("displaytype", 5), Some("Target"));
        assert_eq!(label_for("heartrate", 0), None);
    }
}
