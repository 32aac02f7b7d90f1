use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mira")]
#[command(about = "Conversational operations assistant for the academy CRM", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Data directory holding the CRM store, config and session transcripts.
    /// Defaults to MIRA_HOME, then ./mira.
    #[arg(long, global = true)]
    pub(crate) data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create the local CRM store.
    Init {
        /// Also store a few starter knowledge-base snippets.
        #[arg(long)]
        seed: bool,
    },

    /// Print the tool catalog advertised to the model.
    Tools {
        /// Full descriptors as JSON instead of a name/description table.
        #[arg(long)]
        json: bool,
    },

    /// Send one message and print the reply.
    Ask {
        prompt: String,
        /// Attach an image file to the turn.
        #[arg(long)]
        image: Option<PathBuf>,
        /// Guest mode: no tools, no CRM access.
        #[arg(long)]
        guest: bool,
        /// Print the whole conversation as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive chat. The transcript persists across runs per session.
    Chat {
        /// Session name for transcript persistence.
        #[arg(long, default_value = "default")]
        session: String,
        /// Guest mode: no tools, no CRM access.
        #[arg(long)]
        guest: bool,
    },

    /// Live voice session: microphone in, spoken replies out.
    /// Typed lines are sent into the session; /stop ends it.
    Voice {
        /// Guest mode: no tools, no CRM access.
        #[arg(long)]
        guest: bool,
    },

    /// Print the financial summary (income, tuition payments, expenses).
    Summary {
        #[arg(long)]
        json: bool,
    },
}
