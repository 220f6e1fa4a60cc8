// ABOUTME: Collects messages from one channel through a temporary event group
// ABOUTME: Ends on count limits, a timeout, or deletion of the channel or its server

use crate::error::{CollectorError, EventError};
use crate::events::{listener_fn, names, EventOrder, EventPayload, EventRegistry};
use crate::traits::{Channel, IncomingMessage};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct CollectorOptions {
    /// Stop after this many messages pass the filter
    pub max: Option<usize>,
    /// Stop after this many messages from the channel were seen
    pub max_processed: Option<usize>,
    /// Stop after this long
    pub time: Option<Duration>,
    /// Groups that should not see messages from the channel while collecting
    pub skip: Vec<String>,
    /// End reasons reported as [`CollectorError::Ended`] instead of `Ok`
    pub errors: Vec<CollectorEnd>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorEnd {
    Limit,
    ProcessedLimit,
    Time,
    ChannelDelete,
    ServerDelete,
}

#[derive(Debug, Clone)]
pub struct Collected {
    pub messages: Vec<Arc<IncomingMessage>>,
    pub reason: CollectorEnd,
}

#[derive(Default)]
struct CollectState {
    collected: IndexMap<String, Arc<IncomingMessage>>,
    received: usize,
    ended: bool,
}

impl CollectState {
    fn end_reason(&self, options: &CollectorOptions) -> Option<CollectorEnd> {
        if options.max.is_some_and(|max| self.collected.len() >= max) {
            return Some(CollectorEnd::Limit);
        }
        if options
            .max_processed
            .is_some_and(|max| self.received >= max)
        {
            return Some(CollectorEnd::ProcessedLimit);
        }
        None
    }
}

/// Awaits messages on top of an [`EventRegistry`]
#[derive(Clone)]
pub struct MessageCollector {
    events: EventRegistry,
}

impl MessageCollector {
    pub fn new(events: EventRegistry) -> Self {
        Self { events }
    }

    /// Collect messages in `channel` that pass `filter` until an end condition.
    ///
    /// The temporary listener group is always removed before this returns.
    /// Ending for a reason in `options.errors` yields [`CollectorError::Ended`].
    pub async fn await_messages<F>(
        &self,
        channel: &Channel,
        filter: F,
        options: CollectorOptions,
    ) -> Result<Collected, CollectorError>
    where
        F: Fn(&IncomingMessage) -> bool + Send + Sync + 'static,
    {
        let group = format!("collector:{}", uuid::Uuid::new_v4());
        let state = Arc::new(Mutex::new(CollectState::default()));
        let (tx, mut rx) = mpsc::unbounded_channel::<CollectorEnd>();
        let options = Arc::new(options);
        let channel_id = channel.id.clone();
        let server_id = channel.server().map(|s| s.id.clone());

        if let Err(e) = self.register_listeners(
            &group,
            &channel_id,
            server_id,
            Arc::new(filter),
            &state,
            &tx,
            &options,
        ) {
            self.events.unregister_group(&group);
            return Err(e.into());
        }

        let received = match options.time {
            Some(time) => tokio::time::timeout(time, rx.recv())
                .await
                .unwrap_or(Some(CollectorEnd::Time)),
            None => rx.recv().await,
        };
        self.events.unregister_group(&group);
        // `tx` lives in this frame, so the channel cannot close before an end is sent
        let reason = received.unwrap_or(CollectorEnd::Time);

        let messages = {
            let mut state = state.lock();
            state.ended = true;
            std::mem::take(&mut state.collected).into_values().collect()
        };
        tracing::debug!(channel = %channel_id, reason = ?reason, "Collector ended");
        let collected = Collected { messages, reason };
        if options.errors.contains(&reason) {
            return Err(CollectorError::Ended(collected));
        }
        Ok(collected)
    }

    #[allow(clippy::too_many_arguments)]
    fn register_listeners(
        &self,
        group: &str,
        channel_id: &str,
        server_id: Option<String>,
        filter: Arc<dyn Fn(&IncomingMessage) -> bool + Send + Sync>,
        state: &Arc<Mutex<CollectState>>,
        tx: &mpsc::UnboundedSender<CollectorEnd>,
        options: &Arc<CollectorOptions>,
    ) -> Result<(), EventError> {
        let order = options
            .skip
            .iter()
            .fold(EventOrder::new(), |order, skipped| order.after(skipped.clone()));

        let (st, sender, opts, channel) = (state.clone(), tx.clone(), options.clone(), channel_id.to_string());
        self.events.register(
            group,
            names::MESSAGE,
            listener_fn(move |firing, payload| {
                let Some(message) = payload.message() else {
                    return Ok(());
                };
                if message.channel_id != channel {
                    return Ok(());
                }
                for skipped in &opts.skip {
                    firing.skip(skipped.clone());
                }

                let mut state = st.lock();
                if state.ended {
                    return Ok(());
                }
                state.received += 1;
                if filter(message) {
                    state
                        .collected
                        .insert(message.event_id.clone(), message.clone());
                }
                if let Some(reason) = state.end_reason(&opts) {
                    state.ended = true;
                    let _ = sender.send(reason);
                }
                Ok(())
            }),
            order,
        )?;

        let (st, channel) = (state.clone(), channel_id.to_string());
        self.events.register(
            group,
            names::MESSAGE_DELETE,
            listener_fn(move |_, payload| {
                if let EventPayload::MessageDelete {
                    channel_id,
                    message_id,
                } = payload
                {
                    if *channel_id == channel {
                        st.lock().collected.shift_remove(message_id);
                    }
                }
                Ok(())
            }),
            EventOrder::new(),
        )?;

        let (st, sender, channel) = (state.clone(), tx.clone(), channel_id.to_string());
        self.events.register(
            group,
            names::CHANNEL_DELETE,
            listener_fn(move |_, payload| {
                if matches!(payload, EventPayload::ChannelDelete { channel_id } if *channel_id == channel)
                {
                    st.lock().ended = true;
                    let _ = sender.send(CollectorEnd::ChannelDelete);
                }
                Ok(())
            }),
            EventOrder::new(),
        )?;

        if let Some(server) = server_id {
            let (st, sender) = (state.clone(), tx.clone());
            self.events.register(
                group,
                names::SERVER_DELETE,
                listener_fn(move |_, payload| {
                    if matches!(payload, EventPayload::ServerDelete { server_id } if *server_id == server)
                    {
                        st.lock().ended = true;
                        let _ = sender.send(CollectorEnd::ServerDelete);
                    }
                    Ok(())
                }),
                EventOrder::new(),
            )?;
        }
        Ok(())
    }
}
