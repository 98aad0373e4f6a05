//! C2 — SemanticBlocks: group an ordered message list into logical turn
//! blocks via a single left-to-right pass over an explicit state value.

use context_types::{BlockId, BlockType, Message, SemanticBlock};

/// In-progress block under construction during the grouping pass.
struct PendingBlock {
    block_type: BlockType,
    messages: Vec<Message>,
    expecting_assistant: bool,
}

impl PendingBlock {
    fn start(block_type: BlockType, message: &Message, expecting_assistant: bool) -> Self {
        Self {
            block_type,
            messages: vec![message.clone()],
            expecting_assistant,
        }
    }

    fn flush(self) -> SemanticBlock {
        SemanticBlock {
            id: BlockId::new(),
            block_type: self.block_type,
            messages: self.messages,
            expecting_assistant: self.expecting_assistant,
        }
    }
}

/// Group messages into semantic blocks per the transition table:
///
/// | current \ next | User | Assistant | Tool | System |
/// |---|---|---|---|---|
/// | none | start UserAssistantPair, expecting=true | start StandaloneAssistant | start StandaloneTool | start StandaloneAssistant |
/// | expecting assistant | flush; start new UserAssistantPair | append; clear expecting; flush | append | append; clear expecting; flush |
/// | not expecting | flush; start new UserAssistantPair | flush; start new StandaloneAssistant | append (attached to current) | flush; start new StandaloneAssistant |
///
/// Block order preserves original message order; block ids are random, so
/// compare blocks by `(block_type, messages)` in tests.
pub fn group_into_blocks(messages: &[Message]) -> Vec<SemanticBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<PendingBlock> = None;

    for message in messages {
        match (&mut current, message) {
            (None, Message::User { .. }) => {
                current = Some(PendingBlock::start(BlockType::UserAssistantPair, message, true));
            }
            (None, Message::Assistant { .. }) | (None, Message::System { .. }) => {
                current = Some(PendingBlock::start(BlockType::StandaloneAssistant, message, false));
            }
            (None, Message::Tool { .. }) => {
                current = Some(PendingBlock::start(BlockType::StandaloneTool, message, false));
            }

            (Some(block), Message::User { .. }) if block.expecting_assistant => {
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
                current = Some(PendingBlock::start(BlockType::UserAssistantPair, message, true));
            }
            (Some(block), Message::Assistant { .. }) if block.expecting_assistant => {
                block.messages.push(message.clone());
                block.expecting_assistant = false;
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
            }
            (Some(block), Message::Tool { .. }) if block.expecting_assistant => {
                block.messages.push(message.clone());
            }
            (Some(block), Message::System { .. }) if block.expecting_assistant => {
                block.messages.push(message.clone());
                block.expecting_assistant = false;
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
            }

            (Some(_), Message::User { .. }) => {
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
                current = Some(PendingBlock::start(BlockType::UserAssistantPair, message, true));
            }
            (Some(_), Message::Assistant { .. }) => {
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
                current = Some(PendingBlock::start(BlockType::StandaloneAssistant, message, false));
            }
            (Some(block), Message::Tool { .. }) => {
                block.messages.push(message.clone());
            }
            (Some(_), Message::System { .. }) => {
                let finished = current.take().unwrap();
                blocks.push(finished.flush());
                current = Some(PendingBlock::start(BlockType::StandaloneAssistant, message, false));
            }
        }
    }

    if let Some(block) = current {
        blocks.push(block.flush());
    }

    blocks
}
