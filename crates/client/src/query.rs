//! Live, diffed view of a queried object set.
//!
//! [`QueryView`] is the pure part: a snapshot plus [`QueryView::apply`],
//! which folds one diff into it and reports what changed. [`LiveQuery`]
//! pairs a view with the channel its subscription's diffs are routed to.

use objwatch_core::types::{snapshot_from, Entity, Snapshot};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::messages::{QueryDiff, QueryId};

/// What a single diff did to a view, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Add(Entity),
    Change(Entity),
    Remove(Entity),
    /// The snapshot changed; read it from the view.
    Update,
    /// An event was emitted on `object` (an entity name). The snapshot is
    /// untouched.
    Event {
        object: String,
        event: String,
        data: Value,
    },
}

/// Snapshot of one subscription.
#[derive(Debug, Clone)]
pub struct QueryView {
    id: QueryId,
    objects: Snapshot,
}

impl QueryView {
    pub fn new(id: QueryId, objects: impl IntoIterator<Item = Entity>) -> Self {
        Self {
            id,
            objects: snapshot_from(objects),
        }
    }

    pub fn id(&self) -> &QueryId {
        &self.id
    }

    pub fn objects(&self) -> &Snapshot {
        &self.objects
    }

    /// Apply one diff and return the resulting events.
    ///
    /// Diffs addressed to another subscription are ignored.
    pub fn apply(&mut self, diff: QueryDiff) -> Vec<ViewEvent> {
        if diff.query_id() != &self.id {
            tracing::debug!(
                query_id = %self.id,
                diff_query_id = %diff.query_id(),
                "Ignoring diff for another query",
            );
            return Vec::new();
        }

        match diff {
            QueryDiff::Add { object, .. } => {
                self.objects.insert(object.name.clone(), object.clone());
                vec![ViewEvent::Add(object), ViewEvent::Update]
            }
            QueryDiff::Change { object, .. } => {
                self.objects.insert(object.name.clone(), object.clone());
                vec![ViewEvent::Change(object), ViewEvent::Update]
            }
            QueryDiff::Remove { object, .. } => {
                self.objects.remove(&object.name);
                vec![ViewEvent::Remove(object), ViewEvent::Update]
            }
            QueryDiff::Event {
                object,
                event,
                data,
                ..
            } => vec![ViewEvent::Event {
                object,
                event,
                data,
            }],
        }
    }
}

/// A subscribed view fed by the connection's diff router.
#[derive(Debug)]
pub struct LiveQuery {
    view: QueryView,
    diffs: mpsc::UnboundedReceiver<QueryDiff>,
}

impl LiveQuery {
    pub fn new(view: QueryView, diffs: mpsc::UnboundedReceiver<QueryDiff>) -> Self {
        Self { view, diffs }
    }

    pub fn id(&self) -> &QueryId {
        self.view.id()
    }

    pub fn objects(&self) -> &Snapshot {
        self.view.objects()
    }

    /// Wait for the next diff, apply it, and return its events.
    ///
    /// Returns `None` once the subscription has been released (or the
    /// connection lost) and every buffered diff has been applied.
    pub async fn next_events(&mut self) -> Option<Vec<ViewEvent>> {
        let diff = self.diffs.recv().await?;
        Some(self.view.apply(diff))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entity(name: &str, v: i64) -> Entity {
        Entity::new(name, json!({ "v": v }))
    }

    fn qid() -> QueryId {
        QueryId::Number(1)
    }

    #[test]
    fn add_inserts_then_reports_update() {
        let mut view = QueryView::new(qid(), vec![]);
        let events = view.apply(QueryDiff::Add {
            query_id: qid(),
            object: entity("a", 1),
        });
        assert_eq!(events, vec![ViewEvent::Add(entity("a", 1)), ViewEvent::Update]);
        assert_eq!(view.objects()["a"], entity("a", 1));
    }

    #[test]
    fn change_overwrites() {
        let mut view = QueryView::new(qid(), vec![entity("a", 1)]);
        let events = view.apply(QueryDiff::Change {
            query_id: qid(),
            object: entity("a", 2),
        });
        assert_eq!(events, vec![ViewEvent::Change(entity("a", 2)), ViewEvent::Update]);
        assert_eq!(view.objects()["a"].value, json!({"v": 2}));
    }

    #[test]
    fn remove_deletes() {
        let mut view = QueryView::new(qid(), vec![entity("a", 1), entity("b", 2)]);
        let events = view.apply(QueryDiff::Remove {
            query_id: qid(),
            object: entity("a", 1),
        });
        assert_eq!(events, vec![ViewEvent::Remove(entity("a", 1)), ViewEvent::Update]);
        assert!(!view.objects().contains_key("a"));
        assert!(view.objects().contains_key("b"));
    }

    #[test]
    fn event_does_not_touch_snapshot() {
        let mut view = QueryView::new(qid(), vec![entity("sensors/1", 1)]);
        let before = view.objects().clone();
        let events = view.apply(QueryDiff::Event {
            query_id: qid(),
            object: "sensors/1".into(),
            event: "tick".into(),
            data: json!({"v": 5}),
        });
        assert_eq!(
            events,
            vec![ViewEvent::Event {
                object: "sensors/1".into(),
                event: "tick".into(),
                data: json!({"v": 5}),
            }]
        );
        assert_eq!(view.objects(), &before);
    }

    #[test]
    fn diff_for_other_query_is_ignored() {
        let mut view = QueryView::new(qid(), vec![]);
        let events = view.apply(QueryDiff::Add {
            query_id: QueryId::Number(2),
            object: entity("a", 1),
        });
        assert!(events.is_empty());
        assert!(view.objects().is_empty());
    }

    #[test]
    fn snapshot_is_the_fold_of_diffs_in_delivery_order() {
        let initial = vec![entity("a", 0), entity("b", 0)];
        let diffs = vec![
            QueryDiff::Add {
                query_id: qid(),
                object: entity("c", 1),
            },
            QueryDiff::Change {
                query_id: qid(),
                object: entity("a", 2),
            },
            QueryDiff::Remove {
                query_id: qid(),
                object: entity("b", 0),
            },
            QueryDiff::Event {
                query_id: qid(),
                object: "a".into(),
                event: "poke".into(),
                data: Value::Null,
            },
            QueryDiff::Add {
                query_id: qid(),
                object: entity("b", 3),
            },
            QueryDiff::Change {
                query_id: qid(),
                object: entity("c", 4),
            },
            QueryDiff::Remove {
                query_id: qid(),
                object: entity("a", 2),
            },
            QueryDiff::Change {
                query_id: qid(),
                object: entity("c", 5),
            },
        ];

        let mut view = QueryView::new(qid(), initial.clone());
        let mut expected = snapshot_from(initial);
        for diff in diffs {
            match &diff {
                QueryDiff::Add { object, .. } | QueryDiff::Change { object, .. } => {
                    expected.insert(object.name.clone(), object.clone());
                }
                QueryDiff::Remove { object, .. } => {
                    expected.remove(&object.name);
                }
                QueryDiff::Event { .. } => {}
            }
            view.apply(diff);
        }

        assert_eq!(view.objects(), &expected);
        assert_eq!(view.objects().keys().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(view.objects()["c"].value, json!({"v": 5}));
    }

    #[tokio::test]
    async fn live_query_drains_buffer_then_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut live = LiveQuery::new(QueryView::new(qid(), vec![]), rx);

        tx.send(QueryDiff::Add {
            query_id: qid(),
            object: entity("a", 1),
        })
        .unwrap();
        tx.send(QueryDiff::Remove {
            query_id: qid(),
            object: entity("a", 1),
        })
        .unwrap();
        drop(tx);

        let first = live.next_events().await.unwrap();
        assert_eq!(first[0], ViewEvent::Add(entity("a", 1)));
        assert!(live.objects().contains_key("a"));

        let second = live.next_events().await.unwrap();
        assert_eq!(second[0], ViewEvent::Remove(entity("a", 1)));
        assert!(live.objects().is_empty());

        assert!(live.next_events().await.is_none());
    }
}
