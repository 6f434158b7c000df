use anyhow::Context as _;

use crate::command::RunConfigArg;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct CleanArg {
    #[clap(flatten)]
    run_config: RunConfigArg,
}

pub(crate) fn run(arg: &CleanArg) -> anyhow::Result<()> {
    let config = arg.run_config.load()?;
    let mailbox = config.mailbox();
    let removed = mailbox
        .clear_stale()
        .with_context(|| format!("Failed to clean {}", mailbox.dir().display()))?;
    eprintln!(
        "Removed {removed} stale artifact(s) from {}",
        mailbox.dir().display()
    );
    Ok(())
}
