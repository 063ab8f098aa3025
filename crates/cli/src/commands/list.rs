//! List Command

use anyhow::Result;
use clap::Args;
use uisuite_common::EXIT_SUCCESS;

use super::SuiteArgs;
use crate::output::{print_list, CaseDisplay, OutputFormat};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub suite: SuiteArgs,
}

pub fn execute(args: ListArgs, format: OutputFormat) -> Result<i32> {
    let suite = args.suite.load()?;
    let cases: Vec<CaseDisplay> = suite.cases.iter().map(CaseDisplay::from).collect();
    print_list(&cases, format);
    Ok(EXIT_SUCCESS)
}
