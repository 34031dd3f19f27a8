use crate::cli::{Cli, EvalArgs, EvaluateCommands};
use crate::services::api::ApiClient;
use crate::services::config::{Overrides, Settings};
use crate::services::pipeline::{EvaluateOptions, Pipeline};
use crate::services::policy::OpaEvaluator;
use crate::services::render::Rendered;
use anyhow::Context;
use std::io::Write;

/// Runs `evaluate trail|trails` and prints the rendered decision. Returns
/// whether the policy allowed; a deny is not an error.
pub fn handle_evaluate_commands(cli: &Cli, command: &EvaluateCommands) -> anyhow::Result<bool> {
    let settings = Settings::load(&Overrides {
        host: cli.host.clone(),
        org: cli.org.clone(),
        api_token: cli.api_token.clone(),
        config_file: cli.config_file.clone(),
    })?;

    let rendered = match command {
        EvaluateCommands::Trail { trail, args } => {
            let client = client(&settings, args)?;
            let opa = OpaEvaluator::new(&settings.opa_binary, settings.opa_v0_compatible);
            Pipeline::new(&client, &opa, settings.max_workers)
                .evaluate_trail(trail, &options(args))?
        }
        EvaluateCommands::Trails { trails, args } => {
            let client = client(&settings, args)?;
            let opa = OpaEvaluator::new(&settings.opa_binary, settings.opa_v0_compatible);
            Pipeline::new(&client, &opa, settings.max_workers)
                .evaluate_trails(trails, &options(args))?
        }
    };
    print_rendered(&rendered)?;
    Ok(!rendered.exit_is_failure)
}

fn client(settings: &Settings, args: &EvalArgs) -> anyhow::Result<ApiClient> {
    ApiClient::new(
        &settings.host,
        &settings.org,
        &args.flow,
        &settings.api_token,
        settings.timeout,
    )
    .context("failed to set up the API client")
}

fn options(args: &EvalArgs) -> EvaluateOptions {
    EvaluateOptions {
        policy: args.policy.clone(),
        output: args.output.clone(),
        show_input: args.show_input,
        attestations: args.attestations.clone(),
    }
}

fn print_rendered(rendered: &Rendered) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", rendered.text).context("failed to write output")?;
    Ok(())
}
