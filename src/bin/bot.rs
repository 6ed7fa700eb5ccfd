use anyhow::{Context as _, Result};
use async_trait::async_trait;
use dotenvy::dotenv;
use log::{error, info};
use serenity::http::Http;
use serenity::model::application::component::ButtonStyle;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::channel::{AttachmentType, Message};
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, UserId};
use serenity::prelude::*;
use std::sync::Arc;

use concierge::core::{Config, Reply};
use concierge::database::Database;
use concierge::dialogue::DialogueEngine;
use concierge::scheduler::ReminderScheduler;
use concierge::transport::{ChatUser, Event, Notifier};

struct Handler {
    engine: Arc<DialogueEngine>,
}

impl Handler {
    fn chat_user(user: &serenity::model::user::User) -> ChatUser {
        ChatUser::new(user.id.to_string(), Some(user.name.clone()))
    }

    async fn dispatch(&self, ctx: &Context, channel_id: ChannelId, chat: &ChatUser, event: Event) {
        match self.engine.advance(chat, event).await {
            Ok(replies) => {
                for reply in replies {
                    if let Err(e) = send_reply(ctx, channel_id, reply).await {
                        error!("Failed to send reply to {}: {e}", chat.external_id);
                    }
                }
            }
            // A single flow's failure must never take the event loop down
            Err(e) => error!("Dialogue error for user {}: {e}", chat.external_id),
        }
    }
}

/// Render one transport-neutral reply as a Discord message
async fn send_reply(ctx: &Context, channel_id: ChannelId, reply: Reply) -> Result<()> {
    channel_id
        .send_message(&ctx.http, |message| {
            message.content(&reply.text);
            if !reply.keyboard.is_empty() {
                message.components(|components| {
                    for row in &reply.keyboard {
                        components.create_action_row(|action_row| {
                            for button in row {
                                action_row.create_button(|b| {
                                    b.custom_id(&button.tag)
                                        .label(&button.label)
                                        .style(ButtonStyle::Secondary)
                                });
                            }
                            action_row
                        });
                    }
                    components
                });
            }
            if let Some(attachment) = reply.attachment.clone() {
                message.add_file(AttachmentType::Bytes {
                    data: attachment.data.into(),
                    filename: attachment.filename,
                });
            }
            message
        })
        .await?;
    Ok(())
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected and serving", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let chat = Self::chat_user(&msg.author);
        let content = msg.content.trim();
        let event = if content.eq_ignore_ascii_case("/start") || content.eq_ignore_ascii_case("!menu")
        {
            Event::Button("main".to_string())
        } else {
            Event::Text(msg.content.clone())
        };
        self.dispatch(&ctx, msg.channel_id, &chat, event).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::MessageComponent(component) = interaction {
            let chat = Self::chat_user(&component.user);
            let tag = component.data.custom_id.clone();

            // Acknowledge first; the actual replies go out as plain messages
            if let Err(e) = component
                .create_interaction_response(&ctx.http, |response| {
                    response.kind(InteractionResponseType::DeferredUpdateMessage)
                })
                .await
            {
                error!("Failed to acknowledge component interaction: {e}");
            }

            self.dispatch(&ctx, component.channel_id, &chat, Event::Button(tag))
                .await;
        }
    }
}

/// Delivers reminder notifications as Discord DMs
struct DiscordNotifier {
    http: Arc<Http>,
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, recipient: &str, title: &str, message: &str) -> Result<()> {
        let user_id: u64 = recipient
            .parse()
            .with_context(|| format!("Invalid recipient id {recipient:?}"))?;
        let channel = UserId(user_id).create_dm_channel(&self.http).await?;
        channel
            .id
            .say(&self.http, format!("⏰ **{title}**\n{message}"))
            .await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Concierge bot...");

    let database = Database::new(&config.database_path).await?;

    // Start the reminder scheduler
    let http = Arc::new(Http::new(&config.discord_token));
    let scheduler = ReminderScheduler::new(Arc::new(DiscordNotifier { http }));
    let scheduler_handle = scheduler.handle();
    tokio::spawn(scheduler.run());

    // Re-derive pending deliveries; the store is the sole source of truth
    scheduler_handle.recover_pending(&database).await?;

    let engine = Arc::new(DialogueEngine::new(database, scheduler_handle));
    let handler = Handler { engine };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            error!("This could indicate:");
            error!("  - Invalid bot token format");
            error!("  - Network issues reaching Discord API");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
