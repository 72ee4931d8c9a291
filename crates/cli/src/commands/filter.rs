//! filter command - Show or change the bucket list filters
//!
//! Filters only affect what `awss buckets` displays; the cache always holds
//! every bucket.

use awss_core::{BucketFilters, ConfigManager, Result};
use clap::Args;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Filter flags; each takes an optional `true`/`false` and bare means `true`
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Hide buckets no profile can list
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub hide_no_view: Option<bool>,

    /// Hide buckets that can be listed but not read
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub hide_no_download: Option<bool>,

    /// Hide buckets known to be empty
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub hide_empty: Option<bool>,

    /// Show only favorite buckets
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub favorites_only: Option<bool>,

    /// Turn every filter off
    #[arg(long, conflicts_with_all = ["hide_no_view", "hide_no_download", "hide_empty", "favorites_only"])]
    pub reset: bool,
}

impl FilterArgs {
    fn changes_anything(&self) -> bool {
        self.reset
            || self.hide_no_view.is_some()
            || self.hide_no_download.is_some()
            || self.hide_empty.is_some()
            || self.favorites_only.is_some()
    }

    fn apply_to(&self, current: BucketFilters) -> BucketFilters {
        if self.reset {
            return BucketFilters::default();
        }
        BucketFilters {
            hide_no_view: self.hide_no_view.unwrap_or(current.hide_no_view),
            hide_no_download: self.hide_no_download.unwrap_or(current.hide_no_download),
            hide_empty: self.hide_empty.unwrap_or(current.hide_empty),
            favorites_only: self.favorites_only.unwrap_or(current.favorites_only),
        }
    }
}

/// Execute the filter command
pub fn execute(args: FilterArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let manager = match ConfigManager::new() {
        Ok(manager) => manager,
        Err(e) => return formatter.fail(&e),
    };

    match update(&args, &manager) {
        Ok(filters) => {
            if formatter.is_json() {
                formatter.json(&filters);
            } else {
                print_filters(&formatter, &filters);
            }
            ExitCode::Success
        }
        Err(e) => formatter.fail(&e),
    }
}

fn update(args: &FilterArgs, manager: &ConfigManager) -> Result<BucketFilters> {
    let current = manager.filters()?;
    if !args.changes_anything() {
        return Ok(current);
    }
    let filters = args.apply_to(current);
    manager.set_filters(filters)?;
    tracing::debug!(?filters, "Saved bucket filters");
    Ok(filters)
}

fn print_filters(formatter: &Formatter, filters: &BucketFilters) {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    formatter.println(&format!("hide-no-view:     {}", on_off(filters.hide_no_view)));
    formatter.println(&format!("hide-no-download: {}", on_off(filters.hide_no_download)));
    formatter.println(&format!("hide-empty:       {}", on_off(filters.hide_empty)));
    formatter.println(&format!("favorites-only:   {}", on_off(filters.favorites_only)));
}
