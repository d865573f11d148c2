//! Workout programming.
//!
//! [`build_workout`] validates a [`WorkoutRequest`] and turns it into the
//! command list that follows the `Reset` frame.  Nothing here touches a
//! device, so a rejected request never reaches the monitor.

use rowlink_types::{CsafeCommand, CsafeToken, ValidationError, WorkoutRequest};

/// Unit code for meters in `SetHorizontal`.
const UNIT_METERS: u32 = 36;
/// Unit code for watts in `SetPower`.
const UNIT_WATTS: u32 = 88;
/// Split-duration type for time splits.
const SPLIT_TIME: u32 = 0;
/// Split-duration type for distance splits.
const SPLIT_DISTANCE: u32 = 128;

const MIN_WORKOUT_SECONDS: u32 = 20;
/// A split must not produce more than this many splits per piece.
const MAX_SPLITS: u32 = 30;
const MIN_TIME_SPLIT_HUNDREDTHS: u32 = 2000;
const MIN_DISTANCE_SPLIT_METERS: u32 = 100;

/// Calories-per-hour conversion factor used by the monitor.
const CAL_FACTOR: f64 = 4.0 * 0.8604;
/// Resting calorie burn added to every calorie figure.
const CAL_BASE: f64 = 300.0;

// ────────────────────────────────────────────────────────────────────────────
// Unit conversions
// ────────────────────────────────────────────────────────────────────────────

/// Seconds per 500 m at `watts`; 0 when idle.
pub fn pace_for_power(watts: u32) -> f64 {
    if watts == 0 {
        return 0.0;
    }
    (2.8 / f64::from(watts)).cbrt() * 500.0
}

/// Calories per hour at `watts`; 0 when idle.
pub fn calhr_for_power(watts: u32) -> f64 {
    if watts == 0 {
        return 0.0;
    }
    f64::from(watts) * CAL_FACTOR + CAL_BASE
}

/// Watts for a pace of `seconds_per_500m`, rounded.
pub fn power_for_pace(seconds_per_500m: f64) -> f64 {
    (2.8 / (seconds_per_500m / 500.0).powi(3)).round()
}

/// Watts for a calorie burn of `kcal_per_hour`, rounded.
pub fn power_for_calpace(kcal_per_hour: f64) -> f64 {
    ((kcal_per_hour - CAL_BASE) / CAL_FACTOR).round()
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Goal {
    None,
    Program,
    Time { total_seconds: u32 },
    Distance { meters: u32 },
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        })
    }
}

/// Left-pad `[s]` or `[m, s]` to `[h, m, s]`.
fn pad_time(parts: &[u32]) -> Result<[u32; 3], ValidationError> {
    match *parts {
        [s] => Ok([0, 0, s]),
        [m, s] => Ok([0, m, s]),
        [h, m, s] => Ok([h, m, s]),
        _ => Err(ValidationError::InvalidTime {
            components: parts.len(),
        }),
    }
}

fn split_command(goal: Goal, split: f64) -> Result<CsafeCommand, ValidationError> {
    match goal {
        Goal::Time { total_seconds } => {
            let total = total_seconds * 100;
            let min = MIN_TIME_SPLIT_HUNDREDTHS.max(total.div_ceil(MAX_SPLITS));
            let value = (split * 100.0).round();
            if !(f64::from(min)..=f64::from(total)).contains(&value) {
                return Err(ValidationError::InvalidSplit {
                    value: value as i64,
                    min: i64::from(min),
                    max: i64::from(total),
                });
            }
            Ok(CsafeCommand::with_args(
                CsafeToken::SetSplitDuration,
                [SPLIT_TIME, value as u32],
            ))
        }
        Goal::Distance { meters } => {
            if split.fract() != 0.0 {
                return Err(ValidationError::NotWhole {
                    field: "split".to_string(),
                });
            }
            let min = MIN_DISTANCE_SPLIT_METERS.max((meters + MAX_SPLITS / 2) / MAX_SPLITS);
            if !(f64::from(min)..=f64::from(meters)).contains(&split) {
                return Err(ValidationError::InvalidSplit {
                    value: split as i64,
                    min: i64::from(min),
                    max: i64::from(meters),
                });
            }
            Ok(CsafeCommand::with_args(
                CsafeToken::SetSplitDuration,
                [SPLIT_DISTANCE, split as u32],
            ))
        }
        Goal::Program | Goal::None => Err(ValidationError::IncompatibleGoal(
            "split needs a time or distance goal".to_string(),
        )),
    }
}

/// Pace-boat power in watts; `pace` wins over `calpace`, which wins over
/// `powerpace`.
fn pace_boat_watts(request: &WorkoutRequest) -> Result<Option<u32>, ValidationError> {
    let watts = if let Some(pace) = request.pace {
        if !(pace.is_finite() && pace > 0.0) {
            return Err(ValidationError::InvalidPaceBoat(format!(
                "pace {pace} s/500m must be positive"
            )));
        }
        power_for_pace(pace)
    } else if let Some(calpace) = request.calpace {
        power_for_calpace(calpace)
    } else if let Some(watts) = request.powerpace {
        f64::from(watts)
    } else {
        return Ok(None);
    };

    if !(watts.is_finite() && watts >= 1.0) {
        return Err(ValidationError::InvalidPaceBoat(format!(
            "pace boat power {watts} W is below 1 W"
        )));
    }
    Ok(Some(watts.min(f64::from(u32::MAX)) as u32))
}

/// Validate `request` and return the workout command list, ending with
/// `SetProgram` and `GoInUse`.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the first rule the request
/// breaks.
pub fn build_workout(request: &WorkoutRequest) -> Result<Vec<CsafeCommand>, ValidationError> {
    let goals = [
        request.program.is_some(),
        request.workout_time.is_some(),
        request.distance.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    if goals > 1 {
        return Err(ValidationError::IncompatibleGoal(
            "choose one of program, workout_time or distance".to_string(),
        ));
    }

    let mut commands = Vec::new();
    let mut program = 0;

    let goal = if let Some(p) = request.program {
        check_range("program", p, 0, 15)?;
        program = p;
        Goal::Program
    } else if let Some(parts) = &request.workout_time {
        let [h, m, s] = pad_time(parts)?;
        check_range("hours", h, 0, 9)?;
        check_range("minutes", m, 0, 59)?;
        check_range("seconds", s, 0, 59)?;
        let total_seconds = h * 3600 + m * 60 + s;
        if total_seconds < MIN_WORKOUT_SECONDS {
            return Err(ValidationError::WorkoutTooShort {
                seconds: total_seconds,
            });
        }
        commands.push(CsafeCommand::with_args(CsafeToken::SetTWork, [h, m, s]));
        Goal::Time { total_seconds }
    } else if let Some(meters) = request.distance {
        check_range("distance", meters, 100, 50_000)?;
        commands.push(CsafeCommand::with_args(
            CsafeToken::SetHorizontal,
            [meters, UNIT_METERS],
        ));
        Goal::Distance { meters }
    } else {
        Goal::None
    };

    if let Some(split) = request.split {
        commands.push(split_command(goal, split)?);
    }

    if let Some(watts) = pace_boat_watts(request)? {
        commands.push(CsafeCommand::with_args(
            CsafeToken::SetPower,
            [watts, UNIT_WATTS],
        ));
    }

    commands.push(CsafeCommand::with_args(CsafeToken::SetProgram, [program, 0]));
    commands.push(CsafeCommand::new(CsafeToken::GoInUse));
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(commands: &[CsafeCommand]) -> Vec<CsafeToken> {
        commands.iter().map(|c| c.token).collect()
    }

    #[test]
    fn pace_and_calhr_formulas() {
        assert!((pace_for_power(150) - 500.0 * (2.8f64 / 150.0).powf(1.0 / 3.0)).abs() < 1e-9);
        assert!((calhr_for_power(150) - (150.0 * 4.0 * 0.8604 + 300.0)).abs() < 1e-9);
        assert_eq!(pace_for_power(0), 0.0);
        assert_eq!(calhr_for_power(0), 0.0);
    }

    #[test]
    fn pace_conversions_round_trip_to_watts() {
        // 2:00 / 500 m is roughly 203 W.
        assert_eq!(power_for_pace(120.0), 203.0);
        assert_eq!(power_for_calpace(300.0 + 100.0 * CAL_FACTOR), 100.0);
    }

    #[test]
    fn empty_request_selects_program_zero() {
        let commands = build_workout(&WorkoutRequest::default()).unwrap();
        assert_eq!(
            commands,
            vec![
                CsafeCommand::with_args(CsafeToken::SetProgram, [0, 0]),
                CsafeCommand::new(CsafeToken::GoInUse),
            ]
        );
    }

    #[test]
    fn program_goal() {
        let commands = build_workout(&WorkoutRequest::program(3)).unwrap();
        assert_eq!(commands[0].args, vec![3, 0]);
        assert!(matches!(
            build_workout(&WorkoutRequest::program(16)),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn more_than_one_goal_is_rejected() {
        let request = WorkoutRequest {
            program: Some(1),
            distance: Some(2000),
            ..WorkoutRequest::default()
        };
        assert!(matches!(
            build_workout(&request),
            Err(ValidationError::IncompatibleGoal(_))
        ));
    }

    #[test]
    fn time_goal_is_left_padded() {
        let commands = build_workout(&WorkoutRequest::time([5, 0])).unwrap();
        assert_eq!(
            commands[0],
            CsafeCommand::with_args(CsafeToken::SetTWork, [0, 5, 0])
        );
    }

    #[test]
    fn time_goal_minimum_is_twenty_seconds() {
        assert_eq!(
            build_workout(&WorkoutRequest::time([19])),
            Err(ValidationError::WorkoutTooShort { seconds: 19 })
        );
        assert!(build_workout(&WorkoutRequest::time([20])).is_ok());
        assert!(build_workout(&WorkoutRequest::time([0, 0, 20])).is_ok());
    }

    #[test]
    fn time_components_are_range_checked() {
        assert!(matches!(
            build_workout(&WorkoutRequest::time([10, 0, 0])),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            build_workout(&WorkoutRequest::time([0, 60, 0])),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(
            build_workout(&WorkoutRequest::time(Vec::<u32>::new())),
            Err(ValidationError::InvalidTime { components: 0 })
        );
        assert_eq!(
            build_workout(&WorkoutRequest::time([1, 2, 3, 4])),
            Err(ValidationError::InvalidTime { components: 4 })
        );
    }

    #[test]
    fn distance_bounds() {
        assert!(build_workout(&WorkoutRequest::distance(99)).is_err());
        assert!(build_workout(&WorkoutRequest::distance(50_001)).is_err());
        let commands = build_workout(&WorkoutRequest::distance(100)).unwrap();
        assert_eq!(commands[0].args, vec![100, UNIT_METERS]);
        assert!(build_workout(&WorkoutRequest::distance(50_000)).is_ok());
    }

    #[test]
    fn time_split_limits() {
        // 30 minutes: minimum split is 60 s.
        let ok = build_workout(&WorkoutRequest::time([30, 0]).with_split(60.0)).unwrap();
        assert_eq!(
            ok[1],
            CsafeCommand::with_args(CsafeToken::SetSplitDuration, [SPLIT_TIME, 6000])
        );
        assert!(matches!(
            build_workout(&WorkoutRequest::time([30, 0]).with_split(59.99)),
            Err(ValidationError::InvalidSplit { min: 6000, .. })
        ));
        // Short pieces are floored at 20 s.
        assert!(matches!(
            build_workout(&WorkoutRequest::time([1, 0]).with_split(19.0)),
            Err(ValidationError::InvalidSplit { min: 2000, .. })
        ));
        assert!(build_workout(&WorkoutRequest::time([1, 0]).with_split(61.0)).is_err());
    }

    #[test]
    fn time_split_minimum_rounds_up() {
        // 1001 s: 100100 / 30 = 3336.67, minimum is 3337 hundredths.
        let request = WorkoutRequest::time([16, 41]);
        assert!(build_workout(&request.clone().with_split(33.36)).is_err());
        assert!(build_workout(&request.with_split(33.37)).is_ok());
    }

    #[test]
    fn distance_split_limits() {
        let ok = build_workout(&WorkoutRequest::distance(6000).with_split(200.0)).unwrap();
        assert_eq!(
            ok[1],
            CsafeCommand::with_args(CsafeToken::SetSplitDuration, [SPLIT_DISTANCE, 200])
        );
        assert!(matches!(
            build_workout(&WorkoutRequest::distance(6000).with_split(199.0)),
            Err(ValidationError::InvalidSplit { min: 200, .. })
        ));
        assert!(matches!(
            build_workout(&WorkoutRequest::distance(2000).with_split(500.5)),
            Err(ValidationError::NotWhole { .. })
        ));
        assert!(build_workout(&WorkoutRequest::distance(2000).with_split(2001.0)).is_err());
    }

    #[test]
    fn split_without_time_or_distance_is_rejected() {
        assert!(matches!(
            build_workout(&WorkoutRequest::program(2).with_split(60.0)),
            Err(ValidationError::IncompatibleGoal(_))
        ));
        assert!(matches!(
            build_workout(&WorkoutRequest::default().with_split(60.0)),
            Err(ValidationError::IncompatibleGoal(_))
        ));
    }

    #[test]
    fn pace_boat_precedence() {
        let request = WorkoutRequest::distance(2000)
            .with_pace(120.0)
            .with_calpace(1000.0)
            .with_powerpace(50);
        let commands = build_workout(&request).unwrap();
        let set_power = commands
            .iter()
            .find(|c| c.token == CsafeToken::SetPower)
            .unwrap();
        assert_eq!(set_power.args, vec![203, UNIT_WATTS]);

        let commands = build_workout(&WorkoutRequest::distance(2000).with_powerpace(50)).unwrap();
        assert_eq!(
            tokens(&commands),
            vec![
                CsafeToken::SetHorizontal,
                CsafeToken::SetPower,
                CsafeToken::SetProgram,
                CsafeToken::GoInUse,
            ]
        );
    }

    #[test]
    fn pace_boat_must_be_positive() {
        assert!(matches!(
            build_workout(&WorkoutRequest::distance(2000).with_pace(0.0)),
            Err(ValidationError::InvalidPaceBoat(_))
        ));
        assert!(matches!(
            build_workout(&WorkoutRequest::distance(2000).with_calpace(250.0)),
            Err(ValidationError::InvalidPaceBoat(_))
        ));
        assert!(matches!(
            build_workout(&WorkoutRequest::distance(2000).with_powerpace(0)),
            Err(ValidationError::InvalidPaceBoat(_))
        ));
    }
}
