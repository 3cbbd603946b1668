//! Interactive prompt utilities.

use dialoguer::{Input, Password, theme::ColorfulTheme};

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt for text input.
pub fn input(prompt: &str) -> Result<String, dialoguer::Error> {
    Input::with_theme(&theme())
        .with_prompt(prompt)
        .interact_text()
}

/// Prompt for a password (hidden input).
pub fn password(prompt: &str) -> Result<String, dialoguer::Error> {
    Password::with_theme(&theme())
        .with_prompt(prompt)
        .interact()
}
