use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::error::ValidationError;
use crate::freeze::FreezeLog;
use crate::habit::{Habit, HabitId};
use crate::ledger::{count_u32, CompletionLedger};

/// Exact ratio of completed days (or habits) to applicable ones.
///
/// A zero denominator reads as a rate of 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompletionRate {
    pub completed: u32,
    pub total: u32,
}

impl CompletionRate {
    pub fn new(completed: u32, total: u32) -> Self {
        Self {
            completed: completed.min(total),
            total,
        }
    }

    pub fn as_f64(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.completed) / f64::from(self.total)
        }
    }

    pub fn percent(&self) -> u32 {
        (self.as_f64() * 100.0).round() as u32
    }
}

impl PartialEq for CompletionRate {
    fn eq(&self, other: &Self) -> bool {
        u64::from(self.completed) * u64::from(other.total.max(1))
            == u64::from(other.completed) * u64::from(self.total.max(1))
    }
}

impl Eq for CompletionRate {}

impl fmt::Display for CompletionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.completed, self.total, self.percent())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitStats {
    pub habit_id: HabitId,
    pub current_streak: u32,
    pub best_streak: u32,
    pub total_completions: u32,
    pub last_7_days: CompletionRate,
    pub last_30_days: CompletionRate,
}

fn holds_on(
    habit_id: HabitId,
    ledger: &CompletionLedger,
    freezes: &FreezeLog,
    day: NaiveDate,
) -> bool {
    ledger.is_completed(habit_id, day) || freezes.is_covered(habit_id, day)
}

/// Consecutive completed-or-frozen days ending at `today`.
///
/// An unfinished `today` does not break the streak; counting then starts at
/// yesterday.
pub fn current_streak(
    habit: &Habit,
    ledger: &CompletionLedger,
    freezes: &FreezeLog,
    today: NaiveDate,
) -> u32 {
    let start = if holds_on(habit.id, ledger, freezes, today) {
        Some(today)
    } else {
        calendar::previous_day(today)
    };

    let mut streak = 0;
    let mut cursor = start;
    while let Some(day) = cursor {
        if !holds_on(habit.id, ledger, freezes, day) {
            break;
        }
        streak += 1;
        cursor = calendar::previous_day(day);
    }
    streak
}

/// Longest run of consecutive completed-or-frozen days in the whole history.
pub fn best_streak(habit: &Habit, ledger: &CompletionLedger, freezes: &FreezeLog) -> u32 {
    let days: BTreeSet<NaiveDate> = ledger
        .completed_days(habit.id)
        .chain(freezes.covered_days(habit.id))
        .collect();

    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        run = match previous.and_then(|prev| prev.succ_opt()) {
            Some(expected) if expected == day => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(day);
    }
    best
}

/// Completed share of `[start, end]`, ignoring days before the habit existed.
pub fn period_completion_rate(
    habit: &Habit,
    ledger: &CompletionLedger,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CompletionRate, ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidPeriod { start, end });
    }
    let first = start.max(habit.created_on());
    if first > end {
        return Ok(CompletionRate::default());
    }
    let completed = ledger
        .completed_days(habit.id)
        .filter(|day| *day >= first && *day <= end)
        .count();
    Ok(CompletionRate::new(
        count_u32(completed),
        calendar::days_between(first, end),
    ))
}

/// Rate over the `days` calendar days ending at `today`.
pub fn trailing_rate(
    habit: &Habit,
    ledger: &CompletionLedger,
    days: u32,
    today: NaiveDate,
) -> CompletionRate {
    if days == 0 {
        return CompletionRate::default();
    }
    let start = calendar::add_days(today, -(i64::from(days) - 1)).unwrap_or(NaiveDate::MIN);
    period_completion_rate(habit, ledger, start, today).unwrap_or_default()
}

/// One character per day for the `days` days ending at `today`, oldest first.
///
/// `X` completed, `*` frozen, `.` missed, `_` before the habit existed.
pub fn history_graph(
    habit: &Habit,
    ledger: &CompletionLedger,
    freezes: &FreezeLog,
    days: usize,
    today: NaiveDate,
) -> String {
    let mut graph = String::with_capacity(days);
    for offset in (0..days).rev() {
        let Some(day) = i64::try_from(offset)
            .ok()
            .and_then(|offset| calendar::add_days(today, -offset))
        else {
            graph.push('_');
            continue;
        };
        let cell = if !habit.is_applicable_on(day) {
            '_'
        } else if ledger.is_completed(habit.id, day) {
            'X'
        } else if freezes.is_covered(habit.id, day) {
            '*'
        } else {
            '.'
        };
        graph.push(cell);
    }
    graph
}

pub fn summarize(
    habit: &Habit,
    ledger: &CompletionLedger,
    freezes: &FreezeLog,
    today: NaiveDate,
) -> HabitStats {
    HabitStats {
        habit_id: habit.id,
        current_streak: current_streak(habit, ledger, freezes, today),
        best_streak: best_streak(habit, ledger, freezes),
        total_completions: count_u32(ledger.completed_count(habit.id)),
        last_7_days: trailing_rate(habit, ledger, 7, today),
        last_30_days: trailing_rate(habit, ledger, 30, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freeze::StreakFreeze;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn habit_created(created: NaiveDate) -> Habit {
        Habit::builder("Journal")
            .created_on(created)
            .build()
            .unwrap()
    }

    fn ledger_with(habit: &Habit, days: &[NaiveDate]) -> CompletionLedger {
        let mut ledger = CompletionLedger::new();
        for d in days {
            ledger.set_completed(habit.id, *d, true);
        }
        ledger
    }

    #[test]
    fn missed_day_resets_current_but_not_best() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(1), day(2), day(3), day(5)]);
        let freezes = FreezeLog::default();

        assert_eq!(current_streak(&habit, &ledger, &freezes, day(5)), 1);
        assert_eq!(best_streak(&habit, &ledger, &freezes), 3);
    }

    #[test]
    fn unfinished_today_counts_through_yesterday() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(8), day(9), day(10)]);
        let freezes = FreezeLog::default();

        assert_eq!(current_streak(&habit, &ledger, &freezes, day(11)), 3);
        assert_eq!(current_streak(&habit, &ledger, &freezes, day(10)), 3);
        assert_eq!(current_streak(&habit, &ledger, &freezes, day(12)), 0);
    }

    #[test]
    fn uncompleted_record_breaks_streak() {
        let habit = habit_created(day(1));
        let mut ledger = ledger_with(&habit, &[day(3), day(4), day(5)]);
        ledger.toggle(habit.id, day(4));
        let freezes = FreezeLog::default();
        assert_eq!(current_streak(&habit, &ledger, &freezes, day(5)), 1);
        assert_eq!(best_streak(&habit, &ledger, &freezes), 1);
    }

    #[test]
    fn frozen_day_bridges_a_gap() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(2), day(3), day(5), day(6)]);
        let mut freezes = FreezeLog::default();
        freezes.push(StreakFreeze::used(habit.id, day(4), "sick", day(5)));

        assert_eq!(current_streak(&habit, &ledger, &freezes, day(6)), 5);
        assert_eq!(best_streak(&habit, &ledger, &freezes), 5);
        assert_eq!(
            history_graph(&habit, &ledger, &freezes, 7, day(7)),
            ".XX*XX."
        );
        assert_eq!(history_graph(&habit, &ledger, &freezes, 3, day(1)), "__.");
    }

    #[test]
    fn refunded_freeze_no_longer_covers() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(2), day(4)]);
        let mut freezes = FreezeLog::default();
        let mut freeze = StreakFreeze::used(habit.id, day(3), "travel", day(4));
        freeze.used = false;
        freezes.push(freeze);
        assert_eq!(current_streak(&habit, &ledger, &freezes, day(4)), 1);
    }

    #[test]
    fn period_rate_is_exact() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(10), day(11), day(13), day(16), day(20)]);
        let rate = period_completion_rate(&habit, &ledger, day(10), day(16)).unwrap();
        assert_eq!(rate, CompletionRate::new(4, 7));
        assert_eq!(rate.completed, 4);
        assert_eq!(rate.total, 7);
        assert_eq!(rate.percent(), 57);
    }

    #[test]
    fn period_rate_excludes_days_before_creation() {
        let habit = habit_created(day(5));
        let ledger = ledger_with(&habit, &[day(2), day(5), day(6)]);
        let rate = period_completion_rate(&habit, &ledger, day(1), day(8)).unwrap();
        assert_eq!((rate.completed, rate.total), (2, 4));

        let before = period_completion_rate(&habit, &ledger, day(1), day(3)).unwrap();
        assert_eq!(before.total, 0);
        assert_eq!(before.as_f64(), 0.0);
    }

    #[test]
    fn period_rate_rejects_inverted_window() {
        let habit = habit_created(day(1));
        let ledger = CompletionLedger::new();
        assert_eq!(
            period_completion_rate(&habit, &ledger, day(9), day(8)),
            Err(ValidationError::InvalidPeriod {
                start: day(9),
                end: day(8),
            })
        );
    }

    #[test]
    fn summary_bundles_stats() {
        let habit = habit_created(day(1));
        let ledger = ledger_with(&habit, &[day(28), day(29), day(30), day(31)]);
        let stats = summarize(&habit, &ledger, &FreezeLog::default(), day(31));
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.best_streak, 4);
        assert_eq!(stats.total_completions, 4);
        assert_eq!(stats.last_7_days, CompletionRate::new(4, 7));
        assert_eq!(stats.last_30_days, CompletionRate::new(4, 30));
    }

    fn base() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    proptest! {
        #[test]
        fn unbroken_history_counts_every_day(n in 1u32..120, k in 1u32..60) {
            let today = base() + chrono::Duration::days(200);
            let habit = habit_created(base());
            let mut ledger = CompletionLedger::new();
            for offset in 0..n {
                let day = today - chrono::Duration::days(i64::from(offset));
                ledger.set_completed(habit.id, day, true);
            }
            let freezes = FreezeLog::default();
            prop_assert_eq!(current_streak(&habit, &ledger, &freezes, today), n);

            if k < n {
                let gap = today - chrono::Duration::days(i64::from(k));
                ledger.set_completed(habit.id, gap, false);
                prop_assert_eq!(current_streak(&habit, &ledger, &freezes, today), k);
            }
        }

        #[test]
        fn best_streak_never_decreases(offsets in proptest::collection::vec(0i64..90, 1..60)) {
            let habit = habit_created(base());
            let freezes = FreezeLog::default();
            let mut ledger = CompletionLedger::new();
            let mut previous = 0;
            for offset in offsets {
                ledger.set_completed(habit.id, base() + chrono::Duration::days(offset), true);
                let best = best_streak(&habit, &ledger, &freezes);
                prop_assert!(best >= previous);
                previous = best;
            }
        }
    }
}
