use clap::builder::styling::AnsiColor;
use clap::builder::Styles;
use clap::{Args, Parser, Subcommand};

use crate::run::Reports;

const fn extra_build_info() -> &'static str {
    match option_env!("CARGO_BUILD_DESC") {
        Some(e) => e,
        None => env!("CARGO_PKG_VERSION"),
    }
}
pub const VERSION: &str = extra_build_info();
const INFO_STRING: &str = "
🧬 dechimera version ";
const AFTER_STRING: &str = "
   ──────────────────────────────────
   resolve each cell ID and UMI to a single consensus barcode,
   removing PCR chimeras before per-cell barcode counting";

// colouring of the help
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().bold())
    .usage(AnsiColor::BrightMagenta.on_default().bold())
    .literal(AnsiColor::BrightMagenta.on_default())
    .placeholder(AnsiColor::White.on_default());

#[derive(Parser)]
#[command(
    version = VERSION,
    about = format!("{}{}{}", INFO_STRING, VERSION, AFTER_STRING),
    arg_required_else_help = true,
    flatten_help = true,
    styles = STYLES
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve barcodes from a read-to-barcode alignment (.sam without header, or .tsv).
    /// Read names must be formatted as `<read>_<cell_id>_<umi>`, and the barcode is taken from
    /// the third column.
    #[command(arg_required_else_help = true, verbatim_doc_comment)]
    Aligned {
        /// the input alignment
        input: String,

        /// the output .tsv of `<read_id>\t<barcode>` rows
        output: String,

        #[command(flatten)]
        reports: ReportArgs,
    },

    /// Resolve barcodes from clustered sequences, with one `<sequence>\t<count>` row per
    /// cluster. Each sequence is formatted as `<cell_id><umi><barcode>`. The output is sorted by
    /// barcode.
    #[command(arg_required_else_help = true, verbatim_doc_comment)]
    Clustered {
        /// the input .tsv of clustered sequences and their counts
        input: String,

        /// the output .tsv of `<read_id>\t<barcode>` rows
        output: String,

        /// the length of the cell ID and UMI together
        cb_umi_length: usize,

        /// the length of the cell ID
        cb_length: usize,

        #[command(flatten)]
        reports: ReportArgs,
    },
}

#[derive(Args, Clone, Debug)]
pub struct ReportArgs {
    /// write a JSON summary of the run to this file
    #[arg(long)]
    pub stats: Option<String>,

    /// write a table of resolved molecule counts per (barcode, cell) pair to this file
    #[arg(long)]
    pub counts: Option<String>,
}

impl From<&ReportArgs> for Reports {
    fn from(args: &ReportArgs) -> Self {
        Reports {
            stats: args.stats.clone(),
            counts: args.counts.clone(),
        }
    }
}
