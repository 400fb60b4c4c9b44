//! Three-indicator vote on whether a scheme sits at a cyclical bottom.
//!
//! Indicators:
//! 1. `recent_trough`: the latest trough lies within the lookback window
//! 2. `hilbert_phase`: the latest phase is in the trough sector of the cycle
//! 3. `state_cycle`: the smoothed state cycle is negative and rising

use crate::config::BottomSignalConfig;
use crate::hilbert::HilbertCycle;
use crate::series::months_between;
use crate::state_space::StateSpaceCycle;
use crate::turning_points::TurningPoint;
use chrono::NaiveDate;
use serde::Serialize;
use std::f64::consts::PI;

/// Per-indicator votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IndicatorVotes {
    pub recent_trough: bool,
    pub hilbert_phase: bool,
    pub state_cycle: bool,
}

impl IndicatorVotes {
    pub fn as_array(&self) -> [bool; 3] {
        [self.recent_trough, self.hilbert_phase, self.state_cycle]
    }
}

/// Outcome of the bottom-signal vote for one scheme.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BottomSignalVote {
    pub votes: IndicatorVotes,
    pub vote_count: usize,
    pub signal: bool,
    pub phase_coherence: Option<f64>,
    pub persistence: Option<f64>,
}

/// Count affirmative votes; the signal fires at `min_votes` or more.
pub fn tally_votes(votes: &[bool], min_votes: usize) -> (usize, bool) {
    let count = votes.iter().filter(|&&v| v).count();
    (count, count >= min_votes)
}

fn finite_or_none(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

/// Most recent trough within `lookback_months` whole calendar months of the
/// last price date.
fn recent_trough_vote(
    last_price_date: Option<NaiveDate>,
    turning_points: &[TurningPoint],
    lookback_months: u32,
) -> bool {
    let Some(latest) = last_price_date else {
        return false;
    };
    turning_points
        .iter()
        .filter(|p| p.is_trough())
        .max_by_key(|p| p.date)
        .map(|trough| months_between(trough.date, latest) <= i64::from(lookback_months))
        .unwrap_or(false)
}

/// Last phase, reduced to [0, 2π), below π/2 or above 1.5π.
fn hilbert_phase_vote(hilbert: Option<&HilbertCycle>) -> bool {
    match hilbert.and_then(|h| h.phase.last()) {
        Some(&last) if last.is_finite() => {
            let phase = last.rem_euclid(2.0 * PI);
            phase < PI / 2.0 || phase > PI * 1.5
        }
        _ => false,
    }
}

/// Last smoothed cycle value negative with a positive last difference.
fn state_cycle_vote(state: Option<&StateSpaceCycle>) -> bool {
    match state.map(|s| s.cycle.as_slice()) {
        Some([.., prev, last]) => *last < 0.0 && (last - prev) > 0.0,
        _ => false,
    }
}

/// Vote on a bottom signal.
///
/// # Arguments
/// * `price_dates` - Dates of the NAV series; the last one anchors the lookback
/// * `turning_points` - Detected turning points (any order)
/// * `hilbert` - Hilbert cycle result, if available
/// * `state` - State-space cycle result, if available
/// * `config` - Vote threshold and lookback
///
/// Missing or empty inputs cast a negative vote. NaN coherence and
/// persistence are reported as `None`.
pub fn vote_bottom_signal(
    price_dates: &[NaiveDate],
    turning_points: &[TurningPoint],
    hilbert: Option<&HilbertCycle>,
    state: Option<&StateSpaceCycle>,
    config: &BottomSignalConfig,
) -> BottomSignalVote {
    let votes = IndicatorVotes {
        recent_trough: recent_trough_vote(
            price_dates.iter().max().copied(),
            turning_points,
            config.lookback_months,
        ),
        hilbert_phase: hilbert_phase_vote(hilbert),
        state_cycle: state_cycle_vote(state),
    };
    let (vote_count, signal) = tally_votes(&votes.as_array(), config.min_votes);

    BottomSignalVote {
        votes,
        vote_count,
        signal,
        phase_coherence: hilbert.and_then(|h| finite_or_none(h.phase_coherence)),
        persistence: state.and_then(|s| finite_or_none(s.persistence)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turning_points::TurningPointKind;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn trough(date: NaiveDate) -> TurningPoint {
        TurningPoint {
            date,
            index: 0,
            value: -1.0,
            kind: TurningPointKind::Trough,
            prominence: 1.0,
        }
    }

    fn hilbert_with_phase(last: f64, coherence: f64) -> HilbertCycle {
        HilbertCycle {
            cycle: vec![0.0, 0.0],
            amplitude: vec![1.0, 1.0],
            phase: vec![0.0, last],
            phase_coherence: coherence,
            median_period: 12.0,
        }
    }

    fn state_with_cycle(cycle: Vec<f64>, persistence: f64) -> StateSpaceCycle {
        StateSpaceCycle {
            cycle,
            persistence,
            signal_to_noise: 1.0,
            fit: None,
        }
    }

    #[test]
    fn test_tally_two_of_three() {
        assert_eq!(tally_votes(&[true, true, false], 2), (2, true));
        assert_eq!(tally_votes(&[true, false, false], 2), (1, false));
    }

    #[test]
    fn test_recent_trough_whole_months() {
        let dates = [d(2020, 1, 31), d(2020, 7, 31)];
        let config = BottomSignalConfig::default();
        let inside = vote_bottom_signal(&dates, &[trough(d(2020, 1, 31))], None, None, &config);
        assert!(inside.votes.recent_trough);

        let dates = [d(2020, 8, 1)];
        let outside = vote_bottom_signal(&dates, &[trough(d(2020, 1, 31))], None, None, &config);
        assert!(!outside.votes.recent_trough);
    }

    #[test]
    fn test_most_recent_trough_is_used() {
        let dates = [d(2021, 12, 31)];
        let points = [trough(d(2021, 10, 31)), trough(d(2015, 3, 31))];
        let vote = vote_bottom_signal(&dates, &points, None, None, &BottomSignalConfig::default());
        assert!(vote.votes.recent_trough);
    }

    #[test]
    fn test_phase_sector_bounds() {
        assert!(hilbert_phase_vote(Some(&hilbert_with_phase(0.2, 0.5))));
        assert!(hilbert_phase_vote(Some(&hilbert_with_phase(2.0 * PI - 0.1, 0.5))));
        assert!(hilbert_phase_vote(Some(&hilbert_with_phase(-0.1, 0.5))));
        assert!(!hilbert_phase_vote(Some(&hilbert_with_phase(PI, 0.5))));
        assert!(!hilbert_phase_vote(Some(&hilbert_with_phase(4.0 * PI + PI / 2.0, 0.5))));
        assert!(!hilbert_phase_vote(None));
    }

    #[test]
    fn test_state_cycle_negative_and_rising() {
        assert!(state_cycle_vote(Some(&state_with_cycle(vec![-2.0, -1.0], 0.9))));
        assert!(!state_cycle_vote(Some(&state_with_cycle(vec![-1.0, -2.0], 0.9))));
        assert!(!state_cycle_vote(Some(&state_with_cycle(vec![-1.0], 0.9))));
        assert!(!state_cycle_vote(Some(&state_with_cycle(vec![f64::NAN, f64::NAN], 0.9))));
    }

    #[test]
    fn test_full_vote_and_null_metrics() {
        let dates = [d(2020, 6, 30)];
        let hilbert = hilbert_with_phase(0.1, f64::NAN);
        let state = state_with_cycle(vec![-0.5, -0.2], f64::NAN);
        let vote = vote_bottom_signal(
            &dates,
            &[trough(d(2020, 5, 31))],
            Some(&hilbert),
            Some(&state),
            &BottomSignalConfig::default(),
        );
        assert_eq!(vote.vote_count, 3);
        assert!(vote.signal);
        assert_eq!(vote.phase_coherence, None);
        assert_eq!(vote.persistence, None);
    }

    #[test]
    fn test_missing_inputs_vote_false() {
        let vote = vote_bottom_signal(&[], &[], None, None, &BottomSignalConfig::default());
        assert_eq!(vote.vote_count, 0);
        assert!(!vote.signal);
    }
}
