use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::{connection::ConnectionState, player::PlayerState, subscription::SessionSnapshot};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const NEXT: &str = "btn-next";
    pub const PAUSE: &str = "btn-pause";
    pub const LEAVE: &str = "btn-leave";
    pub const REPEAT: &str = "btn-repeat";
    pub const QUEUE: &str = "btn-queue";
    pub const MIX: &str = "btn-mix";
    pub const CONTROLS: &str = "btn-controls";
}

/// Acción de un botón del panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Next,
    /// Pausa o reanuda según el estado actual
    PauseResume,
    Leave,
    Repeat,
    Queue,
    Mix,
    Refresh,
}

impl ControlAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        let action = match custom_id {
            button_ids::NEXT => Self::Next,
            button_ids::PAUSE => Self::PauseResume,
            button_ids::LEAVE => Self::Leave,
            button_ids::REPEAT => Self::Repeat,
            button_ids::QUEUE => Self::Queue,
            button_ids::MIX => Self::Mix,
            button_ids::CONTROLS => Self::Refresh,
            _ => return None,
        };
        Some(action)
    }
}

/// Botones del panel de control para el estado dado
pub fn create_control_panel(snapshot: &SessionSnapshot) -> Vec<CreateActionRow> {
    let ready = snapshot.connection == ConnectionState::Ready;
    let paused = matches!(snapshot.player, PlayerState::Paused | PlayerState::AutoPaused);
    let playing = snapshot.player == PlayerState::Playing;

    let (pause_emoji, pause_label) = if paused { ('▶', "Resume") } else { ('⏸', "Pause") };

    let row1 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PAUSE)
            .emoji(pause_emoji)
            .label(pause_label)
            .style(ButtonStyle::Primary)
            .disabled(!ready || !(playing || paused)),
        CreateButton::new(button_ids::NEXT)
            .emoji('⏭')
            .label("Next")
            .style(ButtonStyle::Secondary)
            .disabled(!ready || !playing),
        CreateButton::new(button_ids::LEAVE)
            .emoji('⏹')
            .label("Stop")
            .style(ButtonStyle::Danger),
    ]);

    let row2 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::REPEAT)
            .emoji('🔁')
            .style(ButtonStyle::Secondary)
            .disabled(!ready || !playing),
        CreateButton::new(button_ids::QUEUE)
            .emoji('📋')
            .label("Queue")
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::MIX)
            .emoji('🔀')
            .style(ButtonStyle::Secondary)
            .disabled(snapshot.pending.len() < 2),
        CreateButton::new(button_ids::CONTROLS)
            .emoji('🔄')
            .style(ButtonStyle::Secondary),
    ]);

    vec![row1, row2]
}
