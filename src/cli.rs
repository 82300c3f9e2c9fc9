use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Log info-level detail (RUST_LOG overrides this)
    #[clap(short, long, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show a day's blocks, backfilling the required ones
    Day {
        /// Day id (yyyy-MM-dd), today by default
        id: Option<String>,
    },
    /// Show a week's blocks, backfilling the required ones
    Week {
        /// Week id (yyyy-Www), the current week by default
        id: Option<String>,
    },
    /// Show a month's blocks
    Month {
        /// Month id (yyyy-MM), the current month by default
        id: Option<String>,
    },
    /// Show a year's blocks, backfilling the required ones
    Year {
        /// Year id (yyyy), the current year by default
        id: Option<String>,
    },
    /// Update fields of one block
    Update {
        /// Block id
        id: String,

        /// Set the title
        #[clap(short, long)]
        title: Option<String>,

        /// Set the content text
        #[clap(short, long)]
        content: Option<String>,

        /// Replace the item list (repeatable; prefix with "DONE: " to
        /// mark an item complete)
        #[clap(short, long)]
        item: Vec<String>,

        /// Set a data field as key=value (repeatable)
        #[clap(short, long)]
        data: Vec<String>,
    },
    /// Write today's journal interactively; lines persist after a
    /// short quiet period
    Journal {
        /// Day id (yyyy-MM-dd), today by default
        date: Option<String>,
    },
    /// Keyword search over all blocks (plain substring, unranked)
    Search {
        query: String,

        /// Restrict to one block kind
        #[clap(short, long)]
        kind: Option<String>,
    },
    /// Semantic recall over indexed documents
    Recall {
        query: String,

        /// Include private documents (journals, private summaries)
        #[clap(short, long, default_value = "false")]
        private: bool,

        /// Earliest day id (yyyy-MM-dd), inclusive
        #[clap(long, requires = "to")]
        from: Option<String>,

        /// Latest day id (yyyy-MM-dd), inclusive
        #[clap(long, requires = "from")]
        to: Option<String>,

        /// Result count
        #[clap(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Ask a question answered from your journal (RAG)
    Ask {
        question: String,

        /// Let the answer draw on private documents
        #[clap(short, long, default_value = "false")]
        private: bool,
    },
    /// Generate the AI summary block for a scope
    Summarize {
        /// Scope id; the scope type is inferred from its shape
        scope_id: String,

        /// Write the private variant (day scopes only)
        #[clap(short, long, default_value = "false")]
        private: bool,
    },
    /// Rebuild the semantic index from all blocks
    Index {
        /// Reindex a single day instead of everything
        #[clap(long)]
        scope: Option<String>,
    },
    /// Reconcile with the remote store (pull, then push)
    Sync {
        /// Only upload local blocks
        #[clap(long, conflicts_with = "pull_only")]
        push_only: bool,

        /// Only download remote blocks
        #[clap(long)]
        pull_only: bool,
    },
    /// Request a login code by email
    Login { email: String },
    /// Verify an emailed login code
    Verify { email: String, code: String },
    /// Forget the stored session
    Logout,
    /// Export all blocks as a JSON snapshot
    Backup {
        /// Output file; stdout when piped, a timestamped file otherwise
        path: Option<PathBuf>,
    },
    /// Import a JSON snapshot (upserts every block)
    Restore {
        /// Input file; stdin when piped
        path: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },
    /// Show store, index, session and provider status
    Status,
}
