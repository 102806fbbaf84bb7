use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playlist_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        repeat_command(),
        mix_command(),
        queue_command(),
        leave_command(),
        controls_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Plays a song from YouTube")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "song", "Song name or URL")
                .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Enqueues the first YouTube playlist matching the query")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "playlist", "Playlist name")
                .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pauses the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes playback")
}

fn repeat_command() -> CreateCommand {
    CreateCommand::new("repeat").description("Plays the current song again after it ends")
}

// Comandos de cola

fn mix_command() -> CreateCommand {
    CreateCommand::new("mix").description("Shuffles the queue")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the current queue")
}

// Comandos de conexión

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Clears the queue and leaves the voice channel")
}

fn controls_command() -> CreateCommand {
    CreateCommand::new("controls").description("Shows the player control panel")
}
