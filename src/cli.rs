//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::geometry::Rect;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGS: i32 = 2;
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// Some images failed
    pub const PARTIAL_FAILURE: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

/// Erase text from slide images using remote inpainting services
#[derive(Debug, Parser)]
#[command(name = "slide-inpaint", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Erase text boxes from images, writing one new variant per image
    Erase(EraseArgs),
    /// Detect text boxes and write merged box files
    Detect(DetectArgs),
    /// Parse an endpoint list and print it, one per line
    Endpoints(EndpointsArgs),
}

#[derive(Debug, Args)]
pub struct EraseArgs {
    /// Images to process
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Directory of `<stem>.json` box files
    #[arg(long)]
    pub boxes_dir: PathBuf,

    /// Output directory for variants and variants.json
    #[arg(short, long)]
    pub out: PathBuf,

    /// Inpaint endpoints, separated by newline, semicolon or comma
    #[arg(long)]
    pub endpoints: Option<String>,

    /// Region of interest `x,y,w,h` in original pixels, applied to every image
    #[arg(long, value_parser = parse_roi)]
    pub roi: Option<Rect>,

    /// Re-detect boxes before erasing
    #[arg(long)]
    pub detect: bool,

    /// Padding around each box in the mask
    #[arg(long)]
    pub padding: Option<u32>,

    /// Padding around the mask when cropping a request
    #[arg(long)]
    pub crop_padding: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Feather sigma for compositing (0 disables)
    #[arg(long)]
    pub feather: Option<f32>,

    /// Config file (defaults to the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl EraseArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            endpoints: self.endpoints.clone(),
            box_padding: self.padding,
            crop_padding: self.crop_padding,
            timeout_secs: self.timeout,
            feather_sigma: self.feather,
            working_height: None,
        }
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Images to process
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Directory of `<stem>.json` box files read by the detector
    #[arg(long)]
    pub boxes_dir: PathBuf,

    /// Output directory for merged box files
    #[arg(short, long)]
    pub out: PathBuf,

    /// Region of interest `x,y,w,h` in original pixels
    #[arg(long, value_parser = parse_roi)]
    pub roi: Option<Rect>,

    /// Working-image height for detection
    #[arg(long)]
    pub working_height: Option<u32>,

    /// Config file (defaults to the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl DetectArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            working_height: self.working_height,
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct EndpointsArgs {
    /// Delimited endpoint string
    pub value: String,
}

/// Parse `x,y,w,h`
pub fn parse_roi(value: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = value
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid ROI '{}': {}", value, e))?;

    match parts.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Ok(Rect::new(*x, *y, *w, *h)),
        [_, _, _, _] => Err(format!("ROI '{}' must have positive width and height", value)),
        _ => Err(format!("ROI '{}' must be x,y,w,h", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roi() {
        assert_eq!(parse_roi("10, 20,30,40"), Ok(Rect::new(10, 20, 30, 40)));
        assert!(parse_roi("10,20,0,40").is_err());
        assert!(parse_roi("10,20,30").is_err());
        assert!(parse_roi("a,b,c,d").is_err());
    }

    #[test]
    fn test_erase_args() {
        let cli = Cli::try_parse_from([
            "slide-inpaint",
            "erase",
            "a.png",
            "b.png",
            "--boxes-dir",
            "boxes",
            "-o",
            "out",
            "--endpoints",
            "http://x;http://y",
            "--roi",
            "0,0,100,50",
            "--padding",
            "3",
            "-vv",
        ])
        .unwrap();

        let Commands::Erase(args) = cli.command else {
            panic!("expected erase");
        };
        assert_eq!(args.images.len(), 2);
        assert_eq!(args.roi, Some(Rect::new(0, 0, 100, 50)));
        assert_eq!(args.verbose, 2);
        let overrides = args.overrides();
        assert_eq!(overrides.endpoints.as_deref(), Some("http://x;http://y"));
        assert_eq!(overrides.box_padding, Some(3));
        assert_eq!(overrides.crop_padding, None);
    }

    #[test]
    fn test_erase_requires_images() {
        assert!(Cli::try_parse_from(["slide-inpaint", "erase", "--boxes-dir", "b", "-o", "o"])
            .is_err());
    }
}
