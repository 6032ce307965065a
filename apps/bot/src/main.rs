mod config;
mod db;
mod intents;
mod operator_layer;
mod render;

use std::sync::Arc;

use autoservice_core::session::CLEANUP_INTERVAL;
use autoservice_core::{
    Clock, ConversationId, Engine, EngineError, Intent, SessionStore, Storage, SystemClock,
};
use sqlx::sqlite::SqlitePoolOptions;
use teloxide::{
    prelude::*,
    types::InputFile,
    utils::command::BotCommands,
};
use tracing_subscriber::prelude::*;

use crate::config::Config;
use crate::db::SqliteStorage;
use crate::operator_layer::OperatorLayer;
use crate::render::{Audience, Body, Outgoing};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "Главное меню")]
    Start,
    #[command(description = "Отменить текущее действие")]
    Cancel,
}

#[derive(Clone)]
struct BotState {
    engine: Arc<Engine>,
    config: Arc<Config>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let operator_layer = config
        .notify_errors
        .then(|| OperatorLayer::new(&config.bot_token, config.operator_chat_id));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(operator_layer)
        .init();

    let pool = SqlitePoolOptions::new()
        .max_connections(3)
        .connect(&config.database_url)
        .await?;
    db::run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.business_offset));
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(pool));
    let engine = Arc::new(Engine::new(
        storage,
        SessionStore::new(clock.clone()),
        clock,
    ));

    let cleanup_engine = engine.clone();
    tokio::spawn(async move {
        run_cleanup(cleanup_engine).await;
    });

    let bot = Bot::new(&config.bot_token);
    tracing::info!(
        offset = %config.business_offset,
        "Appointment bot starting..."
    );

    let state = BotState {
        engine,
        config: Arc::new(config),
    };

    let cmd_handler = Update::filter_message()
        .filter(|msg: Message| intents::is_conversation_chat(&msg.chat))
        .filter_command::<Command>()
        .endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message, cmd: Command| {
                let state = state.clone();
                async move {
                    let intent = match cmd {
                        Command::Start => Intent::Start,
                        Command::Cancel => Intent::Cancel,
                    };
                    dispatch(&bot, msg.chat.id, intent, &state).await?;
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            }
        });

    let text_handler = Update::filter_message()
        .filter(|msg: Message| intents::is_conversation_chat(&msg.chat))
        .endpoint({
            let state = state.clone();
            move |bot: Bot, msg: Message| {
                let state = state.clone();
                async move {
                    if let Some(intent) = msg.text().and_then(intents::from_text) {
                        dispatch(&bot, msg.chat.id, intent, &state).await?;
                    }
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            }
        });

    let callback_handler = Update::filter_callback_query().endpoint({
        let state = state.clone();
        move |bot: Bot, q: CallbackQuery| {
            let state = state.clone();
            async move {
                handle_callback(&bot, q, &state).await?;
                Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
            }
        }
    });

    let handler = dptree::entry()
        .branch(cmd_handler)
        .branch(text_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

// ── Update handlers ──

async fn handle_callback(bot: &Bot, q: CallbackQuery, state: &BotState) -> anyhow::Result<()> {
    bot.answer_callback_query(&q.id).await?;

    let Some(chat) = q.message.as_ref().map(|m| m.chat()) else {
        return Ok(());
    };
    if !intents::is_conversation_chat(chat) {
        return Ok(());
    }
    let chat_id = chat.id;

    match q.data.as_deref().and_then(intents::from_callback) {
        Some(intent) => dispatch(bot, chat_id, intent, state).await,
        None => {
            tracing::debug!(data = ?q.data, "Dropping unknown callback data");
            Ok(())
        }
    }
}

/// Feeds one intent to the engine and delivers whatever it answers.
async fn dispatch(
    bot: &Bot,
    chat_id: ChatId,
    intent: Intent,
    state: &BotState,
) -> anyhow::Result<()> {
    let conversation = ConversationId(chat_id.0);
    tracing::debug!(
        %conversation,
        intent = %serde_json::to_string(&intent).unwrap_or_default(),
        "Incoming intent"
    );
    let outgoing: Vec<Outgoing> = match state.engine.handle(conversation, intent).await {
        Ok(prompts) => prompts
            .iter()
            .map(|p| {
                tracing::debug!(
                    %conversation,
                    prompt = %serde_json::to_string(p).unwrap_or_default(),
                    "Outgoing prompt"
                );
                render::render(p, &state.config)
            })
            .collect(),
        Err(EngineError::StorageUnavailable(e)) => {
            tracing::error!(%conversation, "Storage unavailable: {e:#}");
            vec![render::storage_failure()]
        }
        Err(e) => {
            tracing::error!(%conversation, "Conversation step failed: {e}");
            vec![render::storage_failure()]
        }
    };

    for message in outgoing {
        let target = match message.to {
            Audience::User => chat_id,
            Audience::Operator => ChatId(state.config.operator_chat_id),
        };
        deliver(bot, target, message.body).await?;
    }
    Ok(())
}

async fn deliver(bot: &Bot, chat_id: ChatId, body: Body) -> anyhow::Result<()> {
    match body {
        Body::Text { text, markup } => {
            let request = bot.send_message(chat_id, text);
            match markup {
                Some(markup) => request.reply_markup(markup).await?,
                None => request.await?,
            };
        }
        Body::Photo { path } => {
            bot.send_photo(chat_id, InputFile::file(path)).await?;
        }
        Body::Location {
            latitude,
            longitude,
        } => {
            bot.send_location(chat_id, latitude, longitude).await?;
        }
    }
    Ok(())
}

// ── Housekeeping ──

async fn run_cleanup(engine: Arc<Engine>) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let sessions = engine.sessions().purge_expired();
        let conversations = engine.purge_idle();
        if sessions > 0 || conversations > 0 {
            tracing::info!(sessions, conversations, "Purged expired conversation data");
        }
    }
}
