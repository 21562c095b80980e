use anyhow::{Context as _, Result};
use clap::Subcommand;
use forgehub::model::Username;
use forgehub::users::create_user;

use crate::context::Context;

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Register a new user
    Add {
        /// Login name
        username: Username,

        /// Contact email
        #[arg(long)]
        email: String,
    },
}

pub fn run(ctx: &mut Context, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add { username, email } => {
            let accounts = ctx.config().accounts.clone();
            let user = ctx
                .write(|store| create_user(store, &accounts, &username, &email))
                .with_context(|| format!("Failed to create user '{username}'"))?;
            ctx.format
                .emit(&user, |u| format!("Created user {} (#{})", u.username, u.id))
        }
    }
}
