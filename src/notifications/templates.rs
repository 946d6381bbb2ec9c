//! Plain-text message bodies. Email and WhatsApp share the same text.

use chrono::{DateTime, FixedOffset, NaiveDate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

fn when(at: &DateTime<FixedOffset>) -> String {
    at.format("%A %d %B at %H:%M").to_string()
}

pub fn booking_confirmed(
    member_name: &str,
    coach_name: &str,
    at: &DateTime<FixedOffset>,
    duration_minutes: i64,
) -> Message {
    Message {
        subject: "Your training session is booked".to_string(),
        body: format!(
            "Hi {}, your {}-minute session with {} is confirmed for {}.",
            member_name,
            duration_minutes,
            coach_name,
            when(at)
        ),
    }
}

pub fn booking_cancelled(member_name: &str, coach_name: &str, at: &DateTime<FixedOffset>) -> Message {
    Message {
        subject: "Your training session was cancelled".to_string(),
        body: format!(
            "Hi {}, your session with {} on {} has been cancelled.",
            member_name,
            coach_name,
            when(at)
        ),
    }
}

pub fn session_reminder(member_name: &str, coach_name: &str, at: &DateTime<FixedOffset>) -> Message {
    Message {
        subject: "Reminder: training session tomorrow".to_string(),
        body: format!(
            "Hi {}, a reminder that you train with {} tomorrow, {}.",
            member_name,
            coach_name,
            when(at)
        ),
    }
}

pub fn membership_expiring(member_name: &str, end_date: NaiveDate, days_left: i64) -> Message {
    Message {
        subject: format!("Your membership ends in {} days", days_left),
        body: format!(
            "Hi {}, your gym membership ends on {}. Renew at the front desk or in the app to keep training.",
            member_name,
            end_date.format("%d %B %Y")
        ),
    }
}

pub fn package_low(member_name: &str, remaining_sessions: i64) -> Message {
    let sessions = if remaining_sessions == 1 { "session" } else { "sessions" };
    Message {
        subject: "Your PT package is running low".to_string(),
        body: format!(
            "Hi {}, you have {} {} left in your personal training package.",
            member_name, remaining_sessions, sessions
        ),
    }
}

pub fn welcome(member_name: &str, gym_name: &str) -> Message {
    Message {
        subject: format!("Welcome to {}", gym_name),
        body: format!(
            "Hi {}, welcome to {}! You can now book sessions with your coach.",
            member_name, gym_name
        ),
    }
}
