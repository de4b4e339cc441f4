use std::{io::Write, process, sync::Arc};

use fenceline::{
    application::{
        error::AppError,
        highlight::HighlightGateway,
        render::{HighlightRenderService, RenderRequest, RenderService},
        snippets::SnippetLoader,
    },
    config::{self, Command, Settings},
    infra::{error::InfraError, telemetry, transport::ReqwestTransport},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?error.chain(), "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?error.chain(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let service = build_render_service(&settings)?;
    let path = cli_args.command.input();
    let markdown = tokio::fs::read_to_string(path)
        .await
        .map_err(InfraError::from)?;

    match &cli_args.command {
        Command::Render(_) => {
            let request = RenderRequest::new(markdown).with_source(path.display().to_string());
            let output = service.render(&request).await?;
            info!(
                target = "fenceline::render",
                source = %path.display(),
                code_blocks = output.code_blocks,
                rendered = output.rendered_blocks,
                fallback = output.fallback_blocks,
                "Document rendered"
            );
            write_stdout(&output.html)
        }
        Command::Blocks(_) => {
            let context = service.collect(&markdown);
            let json = serde_json::to_string_pretty(context.registry().blocks())
                .map_err(|err| AppError::unexpected(format!("failed to encode blocks: {err}")))?;
            write_stdout(&json)?;
            write_stdout("\n")
        }
    }
}

fn build_render_service(settings: &Settings) -> Result<HighlightRenderService, AppError> {
    let highlight = &settings.highlight;

    let gateway = match highlight.token.as_deref() {
        Some(token) => {
            let transport =
                ReqwestTransport::new(highlight.endpoint.clone(), token, highlight.timeout)?;
            HighlightGateway::new(Arc::new(transport))
        }
        None => {
            info!(
                target = "fenceline::bootstrap",
                "No highlight token configured; code blocks render unhighlighted"
            );
            HighlightGateway::disabled()
        }
    }
    .with_default_theme(highlight.default_theme.clone())
    .with_options(highlight.options.clone())
    .with_timeout(highlight.timeout)
    .with_result_cache(highlight.result_cache_capacity);

    let snippets = SnippetLoader::new(
        settings.snippets.directories.clone(),
        settings.snippets.cache_capacity,
    );

    Ok(
        HighlightRenderService::new(Arc::new(gateway), Arc::new(snippets))
            .with_sanitizer(settings.render.sanitize_html),
    )
}

fn write_stdout(text: &str) -> Result<(), AppError> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| AppError::from(InfraError::from(err)))
}
