use super::CommandContext;
use crate::error::{CoreError, Result};
use crate::preferences::Theme;

/// Applies a theme to whatever presentation layer is attached.
pub trait ThemeApplier {
    fn apply_theme(&self, theme: Theme) -> Result<()>;
}

/// Switch the UI theme. Persists through preferences, then applies.
#[derive(Debug, Clone)]
pub struct ChangeTheme {
    pub(super) theme: Theme,
    previous: Option<Theme>,
}

impl ChangeTheme {
    pub const NAME: &'static str = "ChangeTheme";

    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            previous: None,
        }
    }

    pub(super) fn has_executed(&self) -> bool {
        self.previous.is_some()
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let previous = ctx.preferences(Self::NAME)?.theme();
        switch_theme(ctx, previous, self.theme)?;
        self.previous = Some(previous);
        tracing::info!(from = %previous, to = %self.theme, "theme changed");
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let Some(previous) = self.previous else {
            return Err(CoreError::command_failed(
                Self::NAME,
                "cannot undo a command that never executed",
                Some(self.theme.to_string()),
            ));
        };
        switch_theme(ctx, self.theme, previous)?;
        tracing::info!(restored = %previous, "theme change undone");
        Ok(())
    }
}

/// Persist `to`, then apply it. If applying fails the stored preference is
/// put back to `from`.
fn switch_theme(ctx: &CommandContext<'_>, from: Theme, to: Theme) -> Result<()> {
    let preferences = ctx.preferences(ChangeTheme::NAME)?;
    preferences.set_theme(to)?;

    let Some(applier) = ctx.theme else {
        return Ok(());
    };
    if let Err(err) = applier.apply_theme(to) {
        if let Err(rollback) = preferences.set_theme(from) {
            tracing::error!(error = %rollback, "failed to roll back theme preference");
        }
        return Err(err);
    }
    Ok(())
}
