//! Topic & Timer Controller
//!
//! Runs once per cycle at the `USER` node, right after the feedback gate:
//!
//! 1. count the driving turn and rotate the topic when the counter exceeds
//!    the interval (announcing the new topic in history)
//! 2. compare elapsed session time with the limit and end the debate once it
//!    is reached (announcing the ending once)

use crate::session::{NodeDelta, SessionState, Statement, StepEvent};
use crate::topics::{Rotation, TopicExhaustion, TopicList};

use super::error::SchedulerError;
use super::node::NodeId;

/// Notice appended when the topic rotates
pub fn topic_changed_notice(topic: &str) -> String {
    format!("The debate topic has changed to: {topic}")
}

/// Notice appended when the debate ends
pub const DEBATE_ENDING_NOTICE: &str = "The debate is about to end now";

/// Outcome of counting one driving turn
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicStep {
    /// No rotation; the new counter value
    Counted(u32),
    /// Rotated to a new topic; the counter is back to 0
    Rotated {
        /// New topic position
        index: usize,
        /// New topic text
        topic: String,
    },
    /// Rotation ran out of topics under [`TopicExhaustion::EndDebate`]
    Exhausted,
}

/// Count one driving turn and rotate when due
///
/// # Errors
///
/// Returns [`SchedulerError::Config`] if the rotated index has no topic.
pub fn count_turn(
    turns_since_rotation: u32,
    interval: u32,
    topic_index: usize,
    topics: &TopicList,
    policy: TopicExhaustion,
) -> Result<TopicStep, SchedulerError> {
    let count = turns_since_rotation.saturating_add(1);
    if count <= interval {
        return Ok(TopicStep::Counted(count));
    }
    match topics.rotate(topic_index, policy) {
        Rotation::To(index) => {
            let topic = topics.get(index).ok_or_else(|| {
                SchedulerError::Config(format!(
                    "topic index {index} out of bounds ({} topics)",
                    topics.len()
                ))
            })?;
            Ok(TopicStep::Rotated {
                index,
                topic: topic.to_string(),
            })
        }
        Rotation::Exhausted => Ok(TopicStep::Exhausted),
    }
}

/// Whether the session has run for at least `limit_secs`
///
/// A session whose timer never started has not expired.
#[must_use]
pub fn timer_expired(start_ms: Option<i64>, now_ms: i64, limit_secs: u64) -> bool {
    let Some(start) = start_ms else {
        return false;
    };
    let limit_ms = i64::try_from(limit_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_sub(start) >= limit_ms
}

/// Controller parameters
#[derive(Clone, Copy, Debug)]
pub struct ControllerSettings {
    /// Driving turns between rotations
    pub topic_interval: u32,
    /// Policy past the last topic
    pub exhaustion: TopicExhaustion,
}

/// Apply the controller to a `USER` delta
///
/// # Errors
///
/// Returns [`SchedulerError::Config`] when rotation lands outside the list.
pub fn run(
    state: &SessionState,
    settings: ControllerSettings,
    topics: &TopicList,
    now_ms: i64,
    delta: &mut NodeDelta,
) -> Result<(), SchedulerError> {
    let mut ending = false;

    match count_turn(
        state.turns_since_topic_rotation,
        settings.topic_interval,
        state.topic_index,
        topics,
        settings.exhaustion,
    )? {
        TopicStep::Counted(count) => {
            delta.turns_since_topic_rotation = Some(count);
            delta.topic_changed = Some(false);
        }
        TopicStep::Rotated { index, topic } => {
            tracing::info!(
                session_id = %state.session_id,
                topic_index = index,
                topic = %topic,
                "Topic rotated"
            );
            delta.emit(StepEvent::statement(
                NodeId::User,
                Statement::notice(topic_changed_notice(&topic)),
            ));
            delta.turns_since_topic_rotation = Some(0);
            delta.topic_changed = Some(true);
            delta.topic = Some((index, topic));
        }
        TopicStep::Exhausted => {
            tracing::info!(session_id = %state.session_id, "Topic list exhausted");
            delta.turns_since_topic_rotation = Some(0);
            delta.topic_changed = Some(false);
            ending = true;
        }
    }

    ending |= timer_expired(
        state.session_start_ms,
        now_ms,
        state.session_duration_limit_secs,
    );

    if ending && !state.debate_ended() {
        tracing::info!(session_id = %state.session_id, "Debate ending");
        delta.emit(StepEvent::statement(
            NodeId::User,
            Statement::notice(DEBATE_ENDING_NOTICE),
        ));
    }
    delta.debate_ended |= ending;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SessionId;
    use pretty_assertions::assert_eq;

    fn topics() -> TopicList {
        TopicList::new(vec!["a".into(), "b".into()]).unwrap()
    }

    #[test]
    fn test_rotation_after_interval_plus_one() {
        let topics = topics();
        let mut count = 0;
        for _ in 0..30 {
            match count_turn(count, 30, 0, &topics, TopicExhaustion::Wrap).unwrap() {
                TopicStep::Counted(c) => count = c,
                other => panic!("rotated early: {other:?}"),
            }
        }
        assert_eq!(count, 30);
        assert_eq!(
            count_turn(count, 30, 0, &topics, TopicExhaustion::Wrap).unwrap(),
            TopicStep::Rotated {
                index: 1,
                topic: "b".into()
            }
        );
    }

    #[test]
    fn test_exhaustion_policies() {
        let topics = topics();
        assert_eq!(
            count_turn(0, 0, 1, &topics, TopicExhaustion::Wrap).unwrap(),
            TopicStep::Rotated {
                index: 0,
                topic: "a".into()
            }
        );
        assert_eq!(
            count_turn(0, 0, 1, &topics, TopicExhaustion::EndDebate).unwrap(),
            TopicStep::Exhausted
        );
    }

    #[test]
    fn test_timer_boundary() {
        assert!(!timer_expired(None, 10_000_000, 1500));
        assert!(!timer_expired(Some(0), 1_499_999, 1500));
        assert!(timer_expired(Some(0), 1_500_000, 1500));
        assert!(timer_expired(Some(0), 9_000_000, 1500));
    }

    #[test]
    fn test_run_announces_rotation() {
        let mut state = SessionState::new(SessionId::from("1"), "a", 1500);
        state.turns_since_topic_rotation = 2;
        let settings = ControllerSettings {
            topic_interval: 2,
            exhaustion: TopicExhaustion::Wrap,
        };
        let mut delta = NodeDelta::default();
        run(&state, settings, &topics(), 0, &mut delta).unwrap();

        assert_eq!(delta.topic, Some((1, "b".to_string())));
        assert_eq!(delta.topic_changed, Some(true));
        assert_eq!(delta.turns_since_topic_rotation, Some(0));
        let notice = delta.events[0].statement.as_ref().unwrap();
        assert_eq!(notice.text, "The debate topic has changed to: b");
        assert!(!delta.debate_ended);
    }

    #[test]
    fn test_run_announces_ending_once() {
        let mut state = SessionState::new(SessionId::from("1"), "a", 10);
        state.start_timer(0);
        let settings = ControllerSettings {
            topic_interval: 30,
            exhaustion: TopicExhaustion::Wrap,
        };

        let mut delta = NodeDelta::default();
        run(&state, settings, &topics(), 10_000, &mut delta).unwrap();
        assert!(delta.debate_ended);
        assert_eq!(
            delta.events[0].statement.as_ref().unwrap().text,
            DEBATE_ENDING_NOTICE
        );

        state.apply(delta);
        let mut again = NodeDelta::default();
        run(&state, settings, &topics(), 20_000, &mut again).unwrap();
        assert!(again.debate_ended);
        assert!(again.events.is_empty());
    }
}
