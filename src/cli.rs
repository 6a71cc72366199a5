//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use epub_downloader_core::Theme;

/// Convert an online book into an EPUB file.
///
/// Downloads every chapter, stylesheet, font, and image of the book through
/// an authenticated reader session and packages them as EPUB 2.
#[derive(Parser, Debug)]
#[command(name = "epub-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Book identifier (usually the ISBN in the reader URL)
    #[arg(value_name = "BOOK_ID")]
    pub book_id: String,

    /// Reader theme applied to every chapter (none, white, sepia, black)
    #[arg(long, value_parser = parse_theme)]
    pub theme: Option<Theme>,

    /// Add reflow styles for e-ink readers
    #[arg(long)]
    pub kindle: bool,

    /// Netscape-format cookie file exported from a logged-in browser
    #[arg(long, value_name = "PATH")]
    pub cookies: Option<PathBuf>,

    /// Directory that receives the book folder (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Minimum spacing between requests in milliseconds (max 60000)
    #[arg(short = 'l', long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    /// Attempts per request, including the first (1-10)
    #[arg(short = 'r', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Reader site root
    #[arg(long, value_name = "URL")]
    pub site_url: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_theme(value: &str) -> Result<Theme, String> {
    value.parse::<Theme>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_minimal_args_parse() {
        let args = Args::try_parse_from(["epub-downloader", "9781098100001"]).unwrap();
        assert_eq!(args.book_id, "9781098100001");
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.kindle);
        assert!(args.theme.is_none());
        assert!(args.rate_limit.is_none());
    }

    #[test]
    fn test_cli_book_id_is_required() {
        let err = Args::try_parse_from(["epub-downloader"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_all_options() {
        let args = Args::try_parse_from([
            "epub-downloader",
            "42",
            "--theme",
            "Black",
            "--kindle",
            "--cookies",
            "c.txt",
            "-o",
            "out",
            "--rate-limit",
            "0",
            "--max-retries",
            "2",
            "--site-url",
            "https://learning.example.com",
        ])
        .unwrap();
        assert_eq!(args.theme, Some(Theme::Black));
        assert!(args.kindle);
        assert_eq!(args.cookies, Some(PathBuf::from("c.txt")));
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.rate_limit, Some(0));
        assert_eq!(args.max_retries, Some(2));
        assert_eq!(args.site_url.as_deref(), Some("https://learning.example.com"));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["epub-downloader", "1", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_rejects_unknown_theme() {
        let err = Args::try_parse_from(["epub-downloader", "1", "--theme", "neon"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rejects_out_of_range_values() {
        assert!(Args::try_parse_from(["epub-downloader", "1", "--max-retries", "0"]).is_err());
        assert!(Args::try_parse_from(["epub-downloader", "1", "--rate-limit", "60001"]).is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["epub-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
