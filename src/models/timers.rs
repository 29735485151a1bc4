//! Deadline, reminder and expiration dates picked relative to today.

use chrono::{Days, Months, NaiveDate};

use super::bookmark::Bookmark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeDate {
    #[default]
    None,
    Days(u32),
    Weeks(u32),
    Months(u32),
    On(NaiveDate),
}

impl RelativeDate {
    /// Month steps clamp to the last day of shorter months.
    pub fn resolve(self, base: NaiveDate) -> Option<NaiveDate> {
        match self {
            RelativeDate::None => None,
            RelativeDate::Days(n) => base.checked_add_days(Days::new(u64::from(n))),
            RelativeDate::Weeks(n) => base.checked_add_days(Days::new(u64::from(n) * 7)),
            RelativeDate::Months(n) => base.checked_add_months(Months::new(n)),
            RelativeDate::On(date) => Some(date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookmarkTimers {
    pub deadline: RelativeDate,
    pub reminder: RelativeDate,
    pub expiration: RelativeDate,
}

impl BookmarkTimers {
    pub fn has_timers(&self) -> bool {
        *self != Self::default()
    }

    pub fn apply(&self, bookmark: &mut Bookmark, today: NaiveDate) {
        bookmark.deadline = self.deadline.resolve(today);
        bookmark.remind_date = self.reminder.resolve(today);
        bookmark.expiration_date = self.expiration.resolve(today);
    }
}
