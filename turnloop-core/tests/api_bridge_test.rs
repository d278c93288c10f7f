use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use turnloop_core::client::{TurnStream, MAX_TURN_COUNT};
use turnloop_core::models::TurnBatch;
use turnloop_core::reactive::testing::{MockObserver, Observation};
use turnloop_core::reactive::{observer_fn, AbortSignal};
use turnloop_core::{
    from_turn_api, Activity, ChatAdapterOptions, ConnectionStatus, ConversationId, TurnApi,
    TurnError,
};

const WAIT: Duration = Duration::from_secs(5);

/// In-memory bot backend answering from a script
#[derive(Default)]
struct ScriptedApi {
    greeting: Vec<TurnBatch>,
    replies: Mutex<VecDeque<Vec<TurnBatch>>>,
    continuations: Mutex<VecDeque<Vec<TurnBatch>>>,
    /// Answer every `continue_turn` with another `Continue` batch
    endless: bool,
    started: AtomicBool,
    emit_start_event: Mutex<Option<bool>>,
    executed: Mutex<Vec<Activity>>,
    continue_calls: AtomicUsize,
}

impl ScriptedApi {
    fn batches(batches: Vec<TurnBatch>) -> TurnStream {
        stream::iter(batches.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl TurnApi for ScriptedApi {
    async fn start_new_conversation(
        &self,
        emit_start_conversation_event: bool,
        _signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        *self.emit_start_event.lock().unwrap() = Some(emit_start_conversation_event);
        self.started.store(true, Ordering::SeqCst);
        Ok(Self::batches(self.greeting.clone()))
    }

    async fn execute_turn(
        &self,
        activity: Activity,
        _signal: &AbortSignal,
    ) -> Result<TurnStream, TurnError> {
        self.executed.lock().unwrap().push(activity);
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Self::batches(reply))
    }

    async fn continue_turn(&self, _signal: &AbortSignal) -> Result<TurnStream, TurnError> {
        let call = self.continue_calls.fetch_add(1, Ordering::SeqCst);
        // Stands in for the network round trip.
        tokio::task::yield_now().await;

        if self.endless {
            return Ok(Self::batches(vec![TurnBatch::continuing(vec![
                Activity::message(format!("more {}", call)),
            ])]));
        }

        let reply = self
            .continuations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Self::batches(reply))
    }

    fn conversation_id(&self) -> Option<ConversationId> {
        self.started
            .load(Ordering::SeqCst)
            .then(|| ConversationId::new("conv-1"))
    }
}

fn greeting_api() -> ScriptedApi {
    ScriptedApi {
        greeting: vec![TurnBatch::waiting(vec![Activity::message("A1")])],
        ..Default::default()
    }
}

fn texts(activities: &[Activity]) -> Vec<String> {
    activities
        .iter()
        .filter_map(|activity| activity.text.clone())
        .collect()
}

fn is_closed<T>(observations: &[Observation<T>]) -> bool {
    observations
        .iter()
        .any(|observation| !matches!(observation, Observation::Next(_)))
}

#[tokio::test]
async fn greeting_is_published_after_online() {
    let api = Arc::new(greeting_api());
    let adapter = from_turn_api(api.clone(), ChatAdapterOptions::default());

    let timeline = Arc::new(Mutex::new(Vec::<String>::new()));
    let record = Arc::clone(&timeline);
    adapter.connection_statuses().subscribe(observer_fn(
        move |status: ConnectionStatus| record.lock().unwrap().push(format!("{:?}", status)),
        |_| {},
        || {},
    ));
    let record = Arc::clone(&timeline);
    adapter.activities().subscribe(observer_fn(
        move |activity: Activity| {
            record
                .lock()
                .unwrap()
                .push(activity.text.unwrap_or_default())
        },
        |_| {},
        || {},
    ));

    for _ in 0..200 {
        if timeline.lock().unwrap().iter().any(|entry| entry == "A1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(
        *timeline.lock().unwrap(),
        vec!["Uninitialized", "Connecting", "Online", "A1"]
    );
    assert_eq!(*api.emit_start_event.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn start_event_option_is_forwarded() {
    let api = Arc::new(greeting_api());
    let adapter = from_turn_api(
        api.clone(),
        ChatAdapterOptions {
            emit_start_conversation_event: false,
        },
    );

    let activities = MockObserver::new();
    adapter.activities().subscribe(activities.clone());
    assert!(activities.wait_until(WAIT, |o| !o.is_empty()).await);

    assert_eq!(*api.emit_start_event.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn posted_activity_is_echoed_before_replies() {
    let api = Arc::new(ScriptedApi {
        replies: Mutex::new(VecDeque::from([vec![TurnBatch::continuing(vec![
            Activity::message("A2"),
        ])]])),
        continuations: Mutex::new(VecDeque::from([vec![TurnBatch::waiting(vec![
            Activity::message("A3"),
        ])]])),
        ..greeting_api()
    });
    let adapter = from_turn_api(api.clone(), ChatAdapterOptions::default());

    let timeline = Arc::new(Mutex::new(Vec::<String>::new()));
    let activities = MockObserver::new();
    adapter.activities().subscribe(activities.clone());
    let record = Arc::clone(&timeline);
    adapter.activities().subscribe(observer_fn(
        move |activity: Activity| {
            record
                .lock()
                .unwrap()
                .push(activity.text.unwrap_or_default())
        },
        |_| {},
        || {},
    ));
    assert!(activities.wait_until(WAIT, |o| o.len() == 1).await);

    let reply = MockObserver::new();
    let record = Arc::clone(&timeline);
    let post = adapter.post_activity(Activity::message("hi"));
    post.subscribe(reply.clone());
    post.subscribe(observer_fn(
        move |id: String| record.lock().unwrap().push(format!("id {}", id)),
        |_| {},
        || {},
    ));

    assert!(activities.wait_until(WAIT, |o| o.len() == 4).await);
    assert!(reply.wait_until(WAIT, is_closed).await);

    let received = activities.values();
    assert_eq!(texts(&received), vec!["A1", "hi", "A2", "A3"]);

    let ids = reply.values();
    assert_eq!(ids.len(), 1);
    assert!(ids[0].starts_with("c1-"));
    assert!(reply.is_completed());

    // The echo carries the id handed to the backend.
    assert_eq!(received[1].id.as_deref(), Some(ids[0].as_str()));
    assert_eq!(api.executed.lock().unwrap()[0].id.as_deref(), Some(ids[0].as_str()));

    let timeline = timeline.lock().unwrap().clone();
    let id_at = timeline
        .iter()
        .position(|entry| entry.starts_with("id c1-"))
        .unwrap();
    let a3_at = timeline.iter().position(|entry| entry == "A3").unwrap();
    assert!(id_at < a3_at, "timeline: {:?}", timeline);
    assert_eq!(api.continue_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn activities_are_stamped_in_order() {
    let mut greeting = Activity::message("A1");
    greeting.reply_to_id = Some("upstream".to_string());

    let api = Arc::new(ScriptedApi {
        greeting: vec![TurnBatch::waiting(vec![greeting, Activity::message("A2")])],
        replies: Mutex::new(VecDeque::from([vec![TurnBatch::waiting(vec![
            Activity::message("A3"),
        ])]])),
        ..Default::default()
    });
    let adapter = from_turn_api(api, ChatAdapterOptions::default());

    let activities = MockObserver::new();
    adapter.activities().subscribe(activities.clone());
    assert!(activities.wait_until(WAIT, |o| o.len() == 2).await);

    let reply = MockObserver::new();
    adapter
        .post_activity(Activity::message("hi"))
        .subscribe(reply.clone());
    assert!(activities.wait_until(WAIT, |o| o.len() == 4).await);

    let received = activities.values();
    assert_eq!(texts(&received), vec!["A1", "A2", "hi", "A3"]);
    assert_eq!(
        received
            .iter()
            .map(|activity| activity.sequence_id())
            .collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2), Some(3)]
    );
    assert!(received.iter().all(|activity| activity.timestamp.is_some()));
    assert!(received.iter().all(|activity| activity.reply_to_id.is_none()));
}

#[tokio::test]
async fn posts_are_sent_in_order() {
    let api = Arc::new(ScriptedApi {
        replies: Mutex::new(VecDeque::from([
            vec![TurnBatch::waiting(vec![Activity::message("reply 1")])],
            vec![TurnBatch::waiting(vec![Activity::message("reply 2")])],
        ])),
        ..greeting_api()
    });
    let adapter = from_turn_api(api.clone(), ChatAdapterOptions::default());

    let activities = MockObserver::new();
    adapter.activities().subscribe(activities.clone());

    let first = MockObserver::new();
    let second = MockObserver::new();
    adapter
        .post_activity(Activity::message("one"))
        .subscribe(first.clone());
    adapter
        .post_activity(Activity::message("two"))
        .subscribe(second.clone());

    assert!(first.wait_until(WAIT, is_closed).await);
    assert!(second.wait_until(WAIT, is_closed).await);
    assert!(activities.wait_until(WAIT, |o| o.len() == 5).await);

    assert_eq!(
        texts(&activities.values()),
        vec!["A1", "one", "reply 1", "two", "reply 2"]
    );
    assert_eq!(texts(&api.executed.lock().unwrap()), vec!["one", "two"]);
    assert_ne!(first.values(), second.values());
}

#[tokio::test]
async fn endless_continuation_is_capped() {
    let api = Arc::new(ScriptedApi {
        replies: Mutex::new(VecDeque::from([vec![TurnBatch::continuing(vec![
            Activity::message("A2"),
        ])]])),
        endless: true,
        ..greeting_api()
    });
    let adapter = from_turn_api(api.clone(), ChatAdapterOptions::default());

    let statuses = MockObserver::new();
    let activities = MockObserver::new();
    adapter.connection_statuses().subscribe(statuses.clone());
    adapter.activities().subscribe(activities.clone());

    let reply = MockObserver::new();
    adapter
        .post_activity(Activity::message("hi"))
        .subscribe(reply.clone());

    assert!(statuses.wait_until(WAIT, is_closed).await);
    assert_eq!(
        statuses.values().last(),
        Some(&ConnectionStatus::FailedToConnect)
    );
    assert_eq!(api.continue_calls.load(Ordering::SeqCst), MAX_TURN_COUNT);

    // Greeting, then one batch per turn up to the cap: the echo and A2, then one per
    // continuation except the one that tripped the cap.
    assert!(activities.wait_until(WAIT, is_closed).await);
    assert_eq!(activities.values().len(), 1 + 2 + (MAX_TURN_COUNT - 1));

    // The backend accepted the activity before the turn ran away.
    assert!(reply.wait_until(WAIT, is_closed).await);
    assert_eq!(reply.values().len(), 1);

    let next = MockObserver::new();
    adapter
        .post_activity(Activity::message("again"))
        .subscribe(next.clone());
    assert!(next.wait_until(WAIT, is_closed).await);
    assert_eq!(next.error(), Some(TurnError::TooManyTurns));
    assert_eq!(api.executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn end_stops_the_session() {
    let api = Arc::new(greeting_api());
    let adapter = from_turn_api(api.clone(), ChatAdapterOptions::default());

    let activities = MockObserver::new();
    adapter.activities().subscribe(activities.clone());
    assert!(activities.wait_until(WAIT, |o| !o.is_empty()).await);

    adapter.end();
    assert!(activities.wait_until(WAIT, is_closed).await);
    assert_eq!(adapter.connection_status(), ConnectionStatus::Ended);

    let reply = MockObserver::new();
    adapter
        .post_activity(Activity::message("hi"))
        .subscribe(reply.clone());
    assert!(reply.wait_until(WAIT, is_closed).await);
    assert_eq!(reply.error(), Some(TurnError::Closed));
    assert!(api.executed.lock().unwrap().is_empty());
}
