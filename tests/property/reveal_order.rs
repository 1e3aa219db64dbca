//! Property-based tests for the reveal and completion timing.
//!
//! Uses proptest to verify, for any burst of fragments with arbitrary gaps:
//! 1. The visible reply is always a prefix of everything received so far.
//! 2. Characters never appear faster than one per reveal interval.
//! 3. Once the stream goes quiet, the reply is finalized with exactly the
//!    concatenated text, and never before it has been fully revealed.
//! 4. At most one message is active at any instant.

use std::time::Duration;

use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use streamchat::config::SessionConfig;
use streamchat::session::Author;
use streamchat::session::controller::SessionController;
use streamchat::transport::loopback::LoopbackConnector;
use streamchat::transport::{LinkEvent, LinkEventKind};

const CADENCE_MS: u64 = 30;
const STEP_MS: u64 = 5;

/// Fragments drawn from ASCII and multi-byte characters.
fn arb_fragment() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!['a', 'b', ' ', 'é', '→', '字']), 0..12)
        .prop_map(|chars| chars.into_iter().collect())
}

/// Gaps stay well under the quiet window so every fragment lands in one reply.
fn arb_burst() -> impl Strategy<Value = Vec<(String, u64)>> {
    prop::collection::vec((arb_fragment(), 0u64..300), 1..12)
        .prop_filter("some text", |burst| burst.iter().any(|(text, _)| !text.is_empty()))
}

struct Run {
    controller: SessionController<LoopbackConnector>,
    _events: mpsc::Receiver<LinkEvent>,
    t0: Instant,
}

impl Run {
    fn connected() -> Self {
        let (tx, rx) = mpsc::channel(16);
        let endpoint = Url::parse("ws://localhost:8000/ws/prop").unwrap();
        let (mut controller, _view) = SessionController::new(
            SessionConfig::default(),
            endpoint,
            LoopbackConnector::new(),
            tx,
        );
        controller.open();
        let t0 = Instant::now();
        let epoch = controller.epoch();
        controller.handle_link_event(LinkEvent::new(epoch, LinkEventKind::Opened), t0);
        Self {
            controller,
            _events: rx,
            t0,
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn fragment(&mut self, text: &str, ms: u64) {
        let epoch = self.controller.epoch();
        let now = self.at(ms);
        self.controller
            .handle_link_event(LinkEvent::new(epoch, LinkEventKind::Fragment(text.to_owned())), now);
    }

    fn reply(&self) -> (String, bool) {
        self.controller
            .session()
            .messages()
            .iter()
            .rev()
            .find(|m| m.author == Author::Remote)
            .map(|m| (m.text.clone(), m.active))
            .unwrap_or_default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn revealed_text_is_paced_prefix_then_exact(burst in arb_burst()) {
        let mut run = Run::connected();
        run.controller.send("question").unwrap();

        // Schedule arrivals on the millisecond timeline.
        let mut arrivals = Vec::new();
        let mut t = 0;
        for (text, gap) in &burst {
            t += gap;
            arrivals.push((t, text.clone()));
        }
        let expected: String = burst.iter().map(|(text, _)| text.as_str()).collect();
        // Empty fragments are ignored, so only non-empty ones count as arrivals.
        let mut with_text = arrivals.iter().filter(|(_, text)| !text.is_empty()).map(|(at, _)| *at);
        let first_arrival = with_text.next().unwrap();
        let last_arrival = with_text.last().unwrap_or(first_arrival);

        let mut received = String::new();
        let mut next = 0;
        let mut finalized_at = None;
        let end = t + 1500 + expected.chars().count() as u64 * CADENCE_MS + 1000;

        let mut ms = 0;
        while ms <= end {
            while next < arrivals.len() && arrivals[next].0 <= ms {
                let (at, text) = &arrivals[next];
                run.fragment(text, *at);
                received.push_str(text);
                next += 1;
            }
            run.controller.poll_timers(run.at(ms));

            let (text, active) = run.reply();
            prop_assert!(received.starts_with(&text), "{text:?} is not a prefix of {received:?}");
            prop_assert!(run.controller.session().active_count() <= 1);

            let shown = text.chars().count() as u64;
            if shown > 0 {
                // The first character is revealed on arrival.
                prop_assert!(
                    shown <= (ms - first_arrival) / CADENCE_MS + 1,
                    "{shown} chars visible {}ms after the first",
                    ms - first_arrival
                );
            }
            if !active && finalized_at.is_none() {
                finalized_at = Some(ms);
                prop_assert_eq!(&text, &expected, "finalized before fully revealed");
            }
            ms += STEP_MS;
        }

        let (text, active) = run.reply();
        prop_assert!(!active);
        prop_assert_eq!(text, expected);
        let finalized_at = finalized_at.unwrap();
        prop_assert!(finalized_at >= last_arrival + 1500);
    }

    #[test]
    fn quiet_gap_splits_stream_into_two_replies(
        first in arb_fragment().prop_filter("non-empty", |s| !s.is_empty()),
        second in arb_fragment().prop_filter("non-empty", |s| !s.is_empty()),
    ) {
        let mut run = Run::connected();
        run.controller.send("question").unwrap();

        run.fragment(&first, 0);
        run.controller.poll_timers(run.at(10_000));
        run.fragment(&second, 10_000);
        run.controller.poll_timers(run.at(20_000));

        let remote: Vec<_> = run
            .controller
            .session()
            .messages()
            .iter()
            .filter(|m| m.author == Author::Remote)
            .map(|m| (m.text.clone(), m.active))
            .collect();
        prop_assert_eq!(remote, vec![(first, false), (second, false)]);
    }
}
