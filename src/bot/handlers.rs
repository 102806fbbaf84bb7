use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use super::{
    music::{PlayRequest, Reply},
    OpenMusicBot,
};
use crate::{
    audio::{announce::Requester, player::PlayerState},
    ui::{
        buttons::{self, ControlAction},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &OpenMusicBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    if let Some(rejection) = bot.music.check_channel(guild_id, command.channel_id) {
        return respond(ctx, &command, rejection).await;
    }

    let music = &bot.music;
    let reply = match command.data.name.as_str() {
        "play" | "playlist" => return handle_play(ctx, &command, bot, guild_id).await,
        "skip" => music.skip(guild_id).await,
        "pause" => music.pause(guild_id).await,
        "resume" => music.resume(guild_id).await,
        "repeat" => music.repeat(guild_id).await,
        "mix" => music.mix(guild_id).await,
        "queue" => music.queue(guild_id).await,
        "leave" => music.leave(guild_id).await,
        "controls" => music.controls(guild_id).await,
        _ => Reply::private("❌ Unknown command"),
    };

    respond(ctx, &command, reply).await
}

/// `play` y `playlist` pueden tardar: se difiere la respuesta
async fn handle_play(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot, guild_id: GuildId) -> Result<()> {
    let query = command
        .data
        .options
        .first()
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let request = PlayRequest {
        guild_id,
        text_channel: command.channel_id,
        member_voice_channel: member_voice_channel(ctx, guild_id, command.user.id),
        requester: Requester {
            name: command
                .member
                .as_ref()
                .and_then(|member| member.nick.clone())
                .unwrap_or_else(|| command.user.name.clone()),
            avatar_url: Some(command.user.face()),
        },
    };

    let reply = if command.data.name == "playlist" {
        bot.music.playlist(&request, &query).await
    } else {
        bot.music.play(&request, &query).await
    };

    let edit = match reply {
        Reply::Text { content, .. } => EditInteractionResponse::new().content(content),
        Reply::Embed { title, description } => {
            EditInteractionResponse::new().embed(embeds::create_reply_embed(&title, &description))
        }
        Reply::Pages(pages) => EditInteractionResponse::new().content(pages.join("\n")),
        Reply::Panel(snapshot) => {
            EditInteractionResponse::new().embed(embeds::create_control_panel_embed(&snapshot))
        }
    };
    command.edit_response(&ctx.http, edit).await?;

    Ok(())
}

/// Maneja los botones del panel de control
pub async fn handle_component(ctx: &Context, component: ComponentInteraction, bot: &OpenMusicBot) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ControlAction::from_custom_id(&component.data.custom_id) else {
        let message = CreateInteractionResponseMessage::new()
            .content("❌ Unknown action")
            .ephemeral(true);
        component
            .create_response(&ctx.http, CreateInteractionResponse::Message(message))
            .await?;
        return Ok(());
    };

    let music = &bot.music;
    let reply = match action {
        ControlAction::Next => music.skip(guild_id).await,
        ControlAction::PauseResume => match music.controls(guild_id).await {
            Reply::Panel(snapshot)
                if matches!(snapshot.player, PlayerState::Paused | PlayerState::AutoPaused) =>
            {
                music.resume(guild_id).await
            }
            Reply::Panel(_) => music.pause(guild_id).await,
            other => other,
        },
        ControlAction::Leave => music.leave(guild_id).await,
        ControlAction::Repeat => music.repeat(guild_id).await,
        ControlAction::Queue => music.queue(guild_id).await,
        ControlAction::Mix => music.mix(guild_id).await,
        ControlAction::Refresh => match music.controls(guild_id).await {
            Reply::Panel(snapshot) => {
                let message = CreateInteractionResponseMessage::new()
                    .embed(embeds::create_control_panel_embed(&snapshot))
                    .components(buttons::create_control_panel(&snapshot));
                component
                    .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
                    .await?;
                return Ok(());
            }
            other => other,
        },
    };

    let (first, followups) = render(reply);
    component
        .create_response(&ctx.http, CreateInteractionResponse::Message(first))
        .await?;
    for followup in followups {
        component.create_followup(&ctx.http, followup).await?;
    }

    Ok(())
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    let (first, followups) = render(reply);
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(first))
        .await?;
    for followup in followups {
        command.create_followup(&ctx.http, followup).await?;
    }

    Ok(())
}

/// Primer mensaje de la respuesta más los seguimientos (páginas de la cola)
fn render(reply: Reply) -> (CreateInteractionResponseMessage, Vec<CreateInteractionResponseFollowup>) {
    match reply {
        Reply::Text { content, ephemeral } => (
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(ephemeral),
            Vec::new(),
        ),
        Reply::Embed { title, description } => (
            CreateInteractionResponseMessage::new().embed(embeds::create_reply_embed(&title, &description)),
            Vec::new(),
        ),
        Reply::Pages(pages) => {
            let mut pages = pages.into_iter();
            let first = CreateInteractionResponseMessage::new().content(pages.next().unwrap_or_default());
            let rest = pages
                .map(|page| CreateInteractionResponseFollowup::new().content(page))
                .collect();
            (first, rest)
        }
        Reply::Panel(snapshot) => (
            CreateInteractionResponseMessage::new()
                .embed(embeds::create_control_panel_embed(&snapshot))
                .components(buttons::create_control_panel(&snapshot)),
            Vec::new(),
        ),
    }
}

fn member_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
}
