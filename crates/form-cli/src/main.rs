mod wizard;

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use form_service::{
    ChatClient, FormService, ServiceError, Settings, list_models, model_ids,
    settings::SETTINGS_FILE,
};
use form_spec::{
    Answers, ExportFormat, FieldRule, FormSchema, JsonFileStore, ValidationError,
    build_render_payload, render_json_ui, render_text,
};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wizard::{AnswerParseError, PromptContext, Verbosity, WizardPresenter, parse_answer};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Generate, fill and export forms with skip logic",
    long_about = "Drafts forms with a language model, walks their conditional paths, validates and records submissions, and exports them as CSV, JSON or Excel"
)]
struct Cli {
    /// Directory holding db.json, forms.cache and settings.json.
    #[arg(long, global = true, env = "FORMSMITH_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,
    /// Log debug output to stderr (RUST_LOG takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ExportMode {
    Csv,
    Json,
    Xlsx,
}

impl From<ExportMode> for ExportFormat {
    fn from(mode: ExportMode) -> Self {
        match mode {
            ExportMode::Csv => ExportFormat::Csv,
            ExportMode::Json => ExportFormat::Json,
            ExportMode::Xlsx => ExportFormat::Xlsx,
        }
    }
}

/// Generator overrides applied on top of settings.json and the environment.
#[derive(Args, Debug, Default)]
struct GeneratorArgs {
    /// auto, openai or ollama.
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

/// Where answers come from.
#[derive(Args, Debug, Default)]
struct AnswerArgs {
    /// JSON file with answers keyed by field id ("-" reads stdin).
    #[arg(long, value_name = "FILE")]
    answers: Option<PathBuf>,
    /// Inline JSON answers, merged over --answers.
    #[arg(long, value_name = "JSON")]
    data: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Draft a form from a description using the configured language model.
    Generate {
        /// What the form should ask about.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        /// Keep the draft in the local cache without storing it.
        #[arg(long)]
        draft: bool,
        #[command(flatten)]
        generator: GeneratorArgs,
    },
    /// Store a form schema read from a JSON file.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List stored forms, newest first.
    List,
    /// Print a form schema as JSON.
    Show { id: String },
    /// Change a form's title.
    Rename { id: String, title: String },
    /// Delete a form and all of its submissions.
    Delete { id: String },
    /// Print the ids of the fields on the path for the given answers.
    Visible {
        id: String,
        #[command(flatten)]
        input: AnswerArgs,
    },
    /// Validate answers against the visible fields.
    Validate {
        id: String,
        #[command(flatten)]
        input: AnswerArgs,
    },
    /// Show the form state for the given answers.
    Render {
        id: String,
        #[command(flatten)]
        input: AnswerArgs,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Validate, filter and record a submission.
    Submit {
        id: String,
        #[command(flatten)]
        input: AnswerArgs,
    },
    /// Fill a form interactively and record the submission.
    Fill {
        id: String,
        #[command(flatten)]
        input: AnswerArgs,
        /// Print the recorded answers as JSON when done.
        #[arg(long)]
        answers_json: bool,
    },
    /// List recorded submissions as JSON.
    Submissions { id: String },
    /// Export submissions as CSV, JSON or an Excel workbook.
    Export {
        id: String,
        #[arg(long, value_enum, default_value_t = ExportMode::Csv)]
        format: ExportMode,
        /// Directory to write the export into.
        #[arg(long, value_name = "DIR", conflicts_with = "stdout")]
        out: Option<PathBuf>,
        /// Print the export instead of writing a file.
        #[arg(long)]
        stdout: bool,
    },
    /// Report structural problems in a stored form.
    Lint { id: String },
    /// Show or change generator settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List the models offered by the configured endpoint.
    Models {
        #[command(flatten)]
        generator: GeneratorArgs,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print stored settings with the resolved provider.
    Show,
    /// Set provider, api_key, base_url or model (empty value clears it).
    Set { key: String, value: String },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let data_dir = cli.data_dir;
    match cli.command {
        Command::Generate {
            prompt,
            draft,
            generator,
        } => run_generate(&data_dir, &prompt.join(" "), draft, &generator),
        Command::Import { file } => run_import(&data_dir, &file),
        Command::List => run_list(&data_dir),
        Command::Show { id } => run_show(&data_dir, &id),
        Command::Rename { id, title } => run_rename(&data_dir, &id, &title),
        Command::Delete { id } => run_delete(&data_dir, &id),
        Command::Visible { id, input } => run_visible(&data_dir, &id, &input),
        Command::Validate { id, input } => run_validate(&data_dir, &id, &input),
        Command::Render { id, input, format } => run_render(&data_dir, &id, &input, format),
        Command::Submit { id, input } => run_submit(&data_dir, &id, &input),
        Command::Fill {
            id,
            input,
            answers_json,
        } => run_fill(&data_dir, &id, &input, cli.verbose, answers_json),
        Command::Submissions { id } => run_submissions(&data_dir, &id),
        Command::Export {
            id,
            format,
            out,
            stdout,
        } => run_export(&data_dir, &id, format.into(), out, stdout),
        Command::Lint { id } => run_lint(&data_dir, &id),
        Command::Settings { action } => run_settings(&data_dir, action),
        Command::Models { generator } => run_models(&data_dir, &generator),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn open_service(data_dir: &Path) -> CliResult<FormService<JsonFileStore>> {
    Ok(FormService::open(data_dir)?)
}

fn load_settings(data_dir: &Path, overrides: &GeneratorArgs) -> CliResult<Settings> {
    let mut settings = Settings::load(&Settings::path_in(data_dir))?;
    settings.apply_env(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))?;
    if let Some(provider) = &overrides.provider {
        settings.set("provider", provider)?;
    }
    if let Some(model) = &overrides.model {
        settings.model = Some(model.clone());
    }
    if let Some(base_url) = &overrides.base_url {
        settings.base_url = Some(base_url.clone());
    }
    if let Some(api_key) = &overrides.api_key {
        settings.api_key = Some(api_key.clone());
    }
    Ok(settings)
}

fn read_answers(input: &AnswerArgs) -> CliResult<Answers> {
    let mut answers = match &input.answers {
        Some(path) if path.as_os_str() == "-" => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw)?;
            parse_answers_json(&raw)?
        }
        Some(path) => parse_answers_json(&fs::read_to_string(path)?)?,
        None => Answers::new(),
    };
    if let Some(inline) = &input.data {
        answers.extend(parse_answers_json(inline)?);
    }
    Ok(answers)
}

fn parse_answers_json(raw: &str) -> CliResult<Answers> {
    if raw.trim().is_empty() {
        return Ok(Answers::new());
    }
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err("answers must be a JSON object keyed by field id".into()),
    }
}

fn run_generate(
    data_dir: &Path,
    prompt: &str,
    draft: bool,
    overrides: &GeneratorArgs,
) -> CliResult<()> {
    let settings = load_settings(data_dir, overrides)?;
    let client = ChatClient::new(settings.resolve())?;
    let mut service = open_service(data_dir)?;
    let target = client.target();
    eprintln!("Generating with {} ({})...", target.provider, target.model);

    let form = service.generate_form(&client, prompt)?;
    let form = if draft {
        form
    } else {
        service.save_form(form)?
    };
    println!("{}", serde_json::to_string_pretty(&form)?);
    print_issues(&form);
    eprintln!(
        "{} form '{}' ({})",
        if draft { "Drafted" } else { "Saved" },
        form.title,
        form.id
    );
    Ok(())
}

fn run_import(data_dir: &Path, file: &Path) -> CliResult<()> {
    let raw = fs::read_to_string(file)?;
    let form: FormSchema = serde_json::from_str(&raw)?;
    let mut service = open_service(data_dir)?;
    let form = service.import(form)?;
    print_issues(&form);
    println!("{}", form.id);
    Ok(())
}

fn run_list(data_dir: &Path) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let forms = service.list()?;
    if forms.is_empty() {
        println!("No forms stored.");
        return Ok(());
    }
    for form in forms {
        println!(
            "{}\t{}\t{} fields\t{}",
            form.id,
            form.title,
            form.fields.len(),
            form.created_at
        );
    }
    Ok(())
}

fn run_show(data_dir: &Path, id: &str) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let form = service.form(id)?;
    println!("{}", serde_json::to_string_pretty(&form)?);
    Ok(())
}

fn run_rename(data_dir: &Path, id: &str, title: &str) -> CliResult<()> {
    let mut service = open_service(data_dir)?;
    let form = service.rename(id, title)?;
    println!("Renamed {} to '{}'", form.id, form.title);
    Ok(())
}

fn run_delete(data_dir: &Path, id: &str) -> CliResult<()> {
    let mut service = open_service(data_dir)?;
    service.delete(id)?;
    println!("Deleted {}", id);
    Ok(())
}

fn run_visible(data_dir: &Path, id: &str, input: &AnswerArgs) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let answers = read_answers(input)?;
    for field_id in service.visible(id, &answers)? {
        println!("{}", field_id);
    }
    Ok(())
}

fn run_validate(data_dir: &Path, id: &str, input: &AnswerArgs) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let answers = read_answers(input)?;
    let result = service.validate(id, &answers)?;
    println!(
        "Validation result: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_errors(&result.errors);

    if result.valid {
        println!("{}", serde_json::to_string_pretty(&result.values)?);
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_errors(errors: &[ValidationError]) {
    if errors.is_empty() {
        return;
    }
    println!("Errors:");
    for error in errors {
        println!("  {} - {} ({})", error.field_id, error.message, error.code);
    }
}

fn run_render(data_dir: &Path, id: &str, input: &AnswerArgs, mode: RenderMode) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let answers = read_answers(input)?;
    let payload = service.render(id, &answers)?;
    match mode {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
    }
    Ok(())
}

fn run_submit(data_dir: &Path, id: &str, input: &AnswerArgs) -> CliResult<()> {
    let mut service = open_service(data_dir)?;
    let answers = read_answers(input)?;
    match service.submit(id, &answers) {
        Ok(submission) => {
            println!("{}", serde_json::to_string_pretty(&submission)?);
            Ok(())
        }
        Err(ServiceError::Validation(errors)) => {
            describe_errors(&errors);
            Err("submission rejected".into())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_fill(
    data_dir: &Path,
    id: &str,
    input: &AnswerArgs,
    verbose: bool,
    answers_json: bool,
) -> CliResult<()> {
    let mut service = open_service(data_dir)?;
    let form = service.form(id)?;
    let mut answers = read_answers(input)?;
    let mut skipped = BTreeSet::new();
    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), answers_json);

    loop {
        let payload = build_render_payload(&form, &answers)?;
        presenter.show_header(&payload);
        presenter.show_status(&payload);

        let pending = payload.fields.iter().find(|field| {
            field.error.is_some() || (field.current_value.is_none() && !skipped.contains(&field.id))
        });
        let Some(pending) = pending else {
            break;
        };
        if let Some(error) = &pending.error {
            eprintln!("{}", error);
        }
        let field = form
            .field(&pending.id)
            .ok_or_else(|| format!("form has no field '{}'", pending.id))?;
        let rule = FieldRule::for_field(field)?;
        let prompt = PromptContext::new(pending, &payload.progress);

        let answer = loop {
            presenter.show_prompt(&prompt);
            let raw = read_line()?.ok_or("input ended before the form was complete")?;
            if raw.trim().eq_ignore_ascii_case("exit") {
                return Err("wizard aborted by user".into());
            }
            let parsed = match parse_answer(field, &raw) {
                Ok(parsed) => parsed,
                Err(err) => {
                    presenter.show_parse_error(&err);
                    continue;
                }
            };
            match parsed.as_ref().map(|value| rule.check(Some(value))) {
                Some(Err(error)) => {
                    presenter.show_parse_error(&AnswerParseError::new(error.message, None))
                }
                _ => break parsed,
            }
        };

        debug!(field_id = %field.id, "answered");
        match answer {
            Some(value) => {
                skipped.remove(&field.id);
                answers.insert(field.id.clone(), value);
            }
            None => {
                answers.remove(&field.id);
                skipped.insert(field.id.clone());
            }
        }
    }

    match service.submit(id, &answers) {
        Ok(submission) => {
            presenter.show_completion(&submission);
            Ok(())
        }
        Err(ServiceError::Validation(errors)) => {
            describe_errors(&errors);
            Err("submission rejected".into())
        }
        Err(err) => Err(err.into()),
    }
}

fn read_line() -> CliResult<Option<String>> {
    print!("> ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn run_submissions(data_dir: &Path, id: &str) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let submissions = service.submissions(id)?;
    println!("{}", serde_json::to_string_pretty(&submissions)?);
    Ok(())
}

fn run_export(
    data_dir: &Path,
    id: &str,
    format: ExportFormat,
    out: Option<PathBuf>,
    stdout: bool,
) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let file = service.export(id, format)?;
    if stdout {
        let mut out = io::stdout().lock();
        out.write_all(&file.body)?;
        out.flush()?;
        return Ok(());
    }
    let dir = out.unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)?;
    let path = dir.join(&file.file_name);
    fs::write(&path, file.body)?;
    println!("{}", path.display());
    Ok(())
}

fn run_lint(data_dir: &Path, id: &str) -> CliResult<()> {
    let service = open_service(data_dir)?;
    let issues = service.lint(id)?;
    if issues.is_empty() {
        println!("No issues found.");
    }
    for issue in &issues {
        println!("- {}", issue);
    }
    Ok(())
}

fn print_issues(form: &FormSchema) {
    for issue in form.issues() {
        eprintln!("warning: {}", issue);
    }
}

fn run_settings(data_dir: &Path, action: SettingsAction) -> CliResult<()> {
    let path = Settings::path_in(data_dir);
    match action {
        SettingsAction::Show => {
            let settings = load_settings(data_dir, &GeneratorArgs::default())?;
            let resolved = settings.resolve();
            println!("provider: {}", settings.provider);
            println!(
                "api_key: {}",
                if settings.api_key.is_some() {
                    "(set)"
                } else {
                    "(unset)"
                }
            );
            println!("base_url: {}", settings.base_url.as_deref().unwrap_or("(default)"));
            println!("model: {}", settings.model.as_deref().unwrap_or("(default)"));
            println!(
                "resolved: {} {} ({})",
                resolved.provider, resolved.model, resolved.base_url
            );
        }
        SettingsAction::Set { key, value } => {
            let mut settings = Settings::load(&path)?;
            settings.set(&key, &value)?;
            settings.save(&path)?;
            println!("Updated {} in {}", key, SETTINGS_FILE);
        }
    }
    Ok(())
}

fn run_models(data_dir: &Path, overrides: &GeneratorArgs) -> CliResult<()> {
    let settings = load_settings(data_dir, overrides)?;
    let resolved = settings.resolve();
    let listing = list_models(&resolved.base_url)?;
    let ids = model_ids(&listing);
    if ids.is_empty() {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}
