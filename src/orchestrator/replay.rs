//! Synthesized event stream for an orchestrated turn

use super::OrchestratedTurn;
use crate::protocol::{
    ItemKind, ItemStatus, OutputItem, ResponseEvent, ResponseRef, ResponseStatus,
};
use crate::translate::ResponseTranslator;

/// Replay a finished turn as Responses events.
///
/// Output indexes follow the final output order: search calls, function
/// calls, then the message.
pub fn replay_events(turn: &OrchestratedTurn, response_id: &str) -> Vec<ResponseEvent> {
    let response =
        ResponseTranslator::translate_with_search(&turn.response, response_id, &turn.outcomes);
    let mut events = vec![ResponseEvent::Created {
        response: ResponseRef {
            id: response.id.clone(),
            status: ResponseStatus::InProgress,
        },
    }];

    let indexed = |kind: ItemKind| {
        response
            .output
            .iter()
            .enumerate()
            .filter(move |(_, item)| item.kind == kind)
    };

    for (index, item) in indexed(ItemKind::WebSearchCall) {
        events.push(ResponseEvent::OutputItemAdded {
            output_index: index,
            item: item.clone(),
        });
        events.push(ResponseEvent::OutputItemDone {
            output_index: index,
            item: item.clone(),
        });
    }

    let message = indexed(ItemKind::Message).next();
    if let Some((index, item)) = message {
        let mut opening = OutputItem::message(&item.id, item.role.clone().unwrap_or_default(), "");
        opening.status = Some(ItemStatus::InProgress);
        events.push(ResponseEvent::OutputItemAdded {
            output_index: index,
            item: opening,
        });

        let text = item.text();
        if !text.is_empty() {
            events.push(ResponseEvent::OutputTextDelta {
                output_index: index,
                item_id: item.id.clone(),
                delta: text,
            });
        }
    }

    for (index, item) in indexed(ItemKind::FunctionCall) {
        events.push(ResponseEvent::OutputItemAdded {
            output_index: index,
            item: item.clone(),
        });
        events.push(ResponseEvent::OutputItemDone {
            output_index: index,
            item: item.clone(),
        });
    }

    if let Some((index, item)) = message {
        events.push(ResponseEvent::OutputItemDone {
            output_index: index,
            item: item.clone(),
        });
    }

    events.push(ResponseEvent::Completed { response });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatChoice, ChatMessage, ChatResponse, Role, ToolCall};
    use crate::search::{SearchOutcome, SearchResults};

    fn turn(message: ChatMessage, outcomes: Vec<SearchOutcome>) -> OrchestratedTurn {
        OrchestratedTurn {
            response: ChatResponse {
                model: "m".to_string(),
                choices: vec![ChatChoice {
                    index: 0,
                    message,
                    finish_reason: None,
                }],
                ..Default::default()
            },
            outcomes,
            messages: Vec::new(),
            upstream_calls: 2,
        }
    }

    #[test]
    fn test_replay_order() {
        let mut message = ChatMessage::text(Role::Assistant, "Here is what I found");
        message.tool_calls = vec![ToolCall::function("call_s", "shell", "{}")];
        let outcomes = vec![
            SearchOutcome::completed("call_1", SearchResults::new("a", vec![])),
            SearchOutcome::failed("call_2", "b", "timeout"),
        ];
        let events = replay_events(&turn(message, outcomes), "resp-r");

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "response.created",
                "response.output_item.added",
                "response.output_item.done",
                "response.output_item.added",
                "response.output_item.done",
                "response.output_item.added",
                "response.output_text.delta",
                "response.output_item.added",
                "response.output_item.done",
                "response.output_item.done",
                "response.completed",
            ]
        );

        match &events[5] {
            ResponseEvent::OutputItemAdded { output_index, item } => {
                assert_eq!(item.kind, ItemKind::Message);
                assert_eq!(*output_index, 3);
                assert!(item.content.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &events[7] {
            ResponseEvent::OutputItemAdded { output_index, item } => {
                assert_eq!(item.name.as_deref(), Some("shell"));
                assert_eq!(*output_index, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
        match events.last() {
            Some(ResponseEvent::Completed { response }) => {
                assert_eq!(response.output.len(), 4);
                assert_eq!(response.output[0].kind, ItemKind::WebSearchCall);
                assert_eq!(response.output[1].status, Some(ItemStatus::Failed));
                assert_eq!(response.output[3].text(), "Here is what I found");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_empty_text_has_no_delta() {
        let events = replay_events(
            &turn(ChatMessage::text(Role::Assistant, ""), vec![]),
            "resp-e",
        );
        assert!(events.iter().all(|e| e.name() != "response.output_text.delta"));
        assert_eq!(events.len(), 4);
    }
}
