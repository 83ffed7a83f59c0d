use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rust_decimal::Decimal;
use shopchat_agent::{ConversationRuntime, InboundMessage, IntentClassifier, TurnOutcome};
use shopchat_core::config::{AppConfig, LoadOptions, StaticConfigProvider};
use shopchat_core::domain::product::ProductRef;
use shopchat_core::flows::FlowAction;
use shopchat_db::{InMemoryAddressStore, InMemoryProductCatalog, InMemoryStateStore};

use crate::commands::{block_on, load_config, CommandResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatOptions {
    pub user: String,
    pub channel: String,
    pub tenant: String,
    pub product: Option<String>,
}

pub fn run(options: &LoadOptions, chat: &ChatOptions) -> CommandResult {
    let config = match load_config("chat", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let session = block_on("chat", run_session(&config, chat, stdin.lock(), stdout.lock()));
    match session {
        Ok(Ok(turns)) => CommandResult::success("chat", format!("session ended after {turns} turn(s)")),
        Ok(Err(error)) => CommandResult::failure("chat", "chat_io", format!("{error:#}"), 7),
        Err(failure) => failure,
    }
}

pub fn demo_catalog() -> Vec<ProductRef> {
    vec![
        ProductRef::new("demo-1", "GLD-NCK-001", "สร้อยคอทองคำ 1 บาท", Decimal::new(9_000, 0)),
        ProductRef::new("demo-2", "RLX-SUB-001", "Rolex Submariner", Decimal::new(450_000, 0)),
        ProductRef::new("demo-3", "DMD-RNG-002", "แหวนเพชร 1 กะรัต", Decimal::new(35_900, 0)),
    ]
}

/// Reads one customer message per line until EOF or `/quit`. Returns the
/// number of turns handled.
pub async fn run_session<R, W>(
    config: &AppConfig,
    chat: &ChatOptions,
    input: R,
    mut output: W,
) -> anyhow::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let runtime = ConversationRuntime::new(
        Arc::new(InMemoryStateStore::default()),
        Arc::new(InMemoryAddressStore::default()),
        Arc::new(InMemoryProductCatalog::with_products(demo_catalog())),
        Arc::new(StaticConfigProvider::new(config.checkout.clone())),
        IntentClassifier::from_config(&config.classifier),
    )
    .with_state_ttl(config.store.state_ttl_secs)
    .with_store_timeout(Duration::from_millis(config.store.operation_timeout_ms));

    let mut history: Vec<String> = Vec::new();
    let mut turns = 0;

    if let Some(code) = &chat.product {
        let opening = format!("สนใจ {code}");
        let outcome = runtime.handle_message(inbound(chat, &opening, &history)).await;
        render(&mut output, &outcome)?;
        history.push(opening);
        turns += 1;
    }

    for line in input.lines() {
        let line = line.context("reading chat input")?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            break;
        }

        let outcome = runtime.handle_message(inbound(chat, text, &history)).await;
        render(&mut output, &outcome)?;
        history.push(text.to_string());
        turns += 1;
    }

    Ok(turns)
}

fn inbound(chat: &ChatOptions, text: &str, history: &[String]) -> InboundMessage {
    InboundMessage::new(&chat.user, &chat.channel, text)
        .with_tenant(&chat.tenant)
        .with_history(history.to_vec())
}

fn render<W: Write>(output: &mut W, outcome: &TurnOutcome) -> anyhow::Result<()> {
    match (&outcome.reply, &outcome.intent) {
        (Some(reply), _) => writeln!(output, "bot> {reply}"),
        (None, Some(intent)) => writeln!(
            output,
            "bot> [{}] {} ({:.2})",
            outcome.route.as_str(),
            intent.intent.as_str(),
            intent.confidence
        ),
        (None, None) => writeln!(output, "bot> [{}]", outcome.route.as_str()),
    }
    .context("writing chat reply")?;

    for action in &outcome.actions {
        if let FlowAction::QuickReplies(options) = action {
            let labels: Vec<_> = options.iter().map(|option| option.label.as_str()).collect();
            writeln!(output, "     options: {}", labels.join(" | ")).context("writing chat reply")?;
        }
    }
    output.flush().context("flushing chat output")?;
    Ok(())
}
