use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use lumina_contracts::brand::{AssetState, BrandConcept, BrandInput, MockupKind, Project};
use lumina_contracts::chat::{parse_walk_command, WalkCommand, WALK_COMMANDS};
use lumina_contracts::events::EventWriter;
use lumina_contracts::projects::{visible_history, ProjectStore};
use lumina_engine::{
    is_capacity_error, AssetSlot, ConceptWalk, DryrunClient, GeminiClient, ImageCapability, Step,
    Studio, TextCapability, STEPS,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "lumina", version, about = "Brand identity studio CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Create(CreateArgs),
    AddConcept(AddConceptArgs),
    List(StoreArgs),
    Show(ProjectArgs),
    Delete(ProjectArgs),
    Walk(WalkArgs),
}

#[derive(Debug, Parser)]
struct CreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    business_type: String,
    #[arg(long)]
    style: String,
    #[arg(long)]
    website: Option<String>,
    #[arg(long, default_value = ".lumina")]
    data_dir: PathBuf,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct AddConceptArgs {
    #[arg(long)]
    project: String,
    #[arg(long, default_value = ".lumina")]
    data_dir: PathBuf,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct StoreArgs {
    #[arg(long, default_value = ".lumina")]
    data_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct ProjectArgs {
    #[arg(long)]
    project: String,
    #[arg(long, default_value = ".lumina")]
    data_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct WalkArgs {
    #[arg(long)]
    project: String,
    #[arg(long, default_value_t = 1)]
    concept: usize,
    #[arg(long, default_value = ".lumina")]
    data_dir: PathBuf,
    #[arg(long)]
    dryrun: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumina error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Create(args) => run_create(args),
        Command::AddConcept(args) => run_add_concept(args),
        Command::List(args) => run_list(args),
        Command::Show(args) => run_show(args),
        Command::Delete(args) => run_delete(args),
        Command::Walk(args) => run_walk(args),
    }
}

fn open_studio(data_dir: &Path, dryrun: bool) -> Result<Studio> {
    let session_id = Uuid::new_v4().to_string();
    let events = EventWriter::new(data_dir.join("events.jsonl"), session_id);
    let store = ProjectStore::open(data_dir, events.clone());
    let (text, image): (Box<dyn TextCapability>, Box<dyn ImageCapability>) = if dryrun {
        (Box::new(DryrunClient::new()), Box::new(DryrunClient::new()))
    } else {
        let client = GeminiClient::from_env()?;
        (Box::new(client.clone()), Box::new(client))
    };
    Ok(Studio::new(store, text, image, events))
}

fn run_create(args: CreateArgs) -> Result<i32> {
    let mut studio = open_studio(&args.data_dir, args.dryrun)?;
    let input = BrandInput {
        company_name: args.name,
        description: args.description,
        business_type: args.business_type,
        brand_style: args.style,
        website_url: args.website,
    };

    println!("Generating a brand concept for {}...", input.company_name);
    let project_id = match studio.create_project(input) {
        Ok(project_id) => project_id,
        Err(err) => {
            if is_capacity_error(&err) {
                eprintln!(
                    "The stored API credential looks invalid or out of quota. \
                     Re-select your API key (GEMINI_API_KEY) and try again."
                );
            }
            return Err(err);
        }
    };

    let project = studio
        .project(&project_id)
        .context("created project missing from the store")?;
    let concept = &project.concepts[0];
    println!();
    println!("Project {project_id}: {}", project.company_name);
    println!("Concept: {} - {}", concept.name, concept.summary);
    println!();
    println!("Next: lumina walk --project {project_id}");
    Ok(0)
}

fn run_add_concept(args: AddConceptArgs) -> Result<i32> {
    let mut studio = open_studio(&args.data_dir, args.dryrun)?;
    let concept_id = match studio.add_concept(&args.project) {
        Ok(concept_id) => concept_id,
        Err(err) => {
            if is_capacity_error(&err) {
                eprintln!(
                    "The stored API credential looks invalid or out of quota. \
                     Re-select your API key (GEMINI_API_KEY) and try again."
                );
            }
            return Err(err);
        }
    };
    let project = studio
        .project(&args.project)
        .context("project missing after adding a concept")?;
    let position = project.concepts.len();
    let concept = project
        .concepts
        .iter()
        .find(|concept| concept.id == concept_id)
        .context("new concept missing from the project")?;
    println!("Concept [{position}]: {} - {}", concept.name, concept.summary);
    println!(
        "Next: lumina walk --project {} --concept {position}",
        args.project
    );
    Ok(0)
}

fn run_list(args: StoreArgs) -> Result<i32> {
    let studio = open_studio(&args.data_dir, true)?;
    if studio.projects().is_empty() {
        println!("No projects yet. Start one with `lumina create`.");
        return Ok(0);
    }
    for project in studio.projects() {
        println!(
            "{:<16} {:<24} {:<14} {:<18} {} concept(s)",
            project.id,
            project.company_name,
            format_created(project.created_at),
            status_label(project),
            project.concepts.len(),
        );
    }
    Ok(0)
}

fn run_show(args: ProjectArgs) -> Result<i32> {
    let studio = open_studio(&args.data_dir, true)?;
    let project = studio
        .project(&args.project)
        .with_context(|| format!("unknown project {}", args.project))?;

    println!("{}: {}", project.id, project.company_name);
    println!(
        "{} | {} | created {}",
        project.business_type,
        project.brand_style,
        format_created(project.created_at)
    );
    if let Some(url) = &project.website_url {
        println!("Website: {url}");
    }
    println!();
    for (index, concept) in project.concepts.iter().enumerate() {
        println!("[{}] {} - {}", index + 1, concept.name, concept.summary);
        println!("    logo: {}", asset_label(&concept.logo_url));
        println!("    moodboard: {}", asset_label(&concept.mood_board_url));
        println!("    mockups: {}", mapping_summary(concept));
        println!(
            "    campaign images: {}/{}",
            concept
                .campaign_assets
                .values()
                .filter(|state| state.is_ready())
                .count(),
            concept.campaigns.len()
        );
    }
    Ok(0)
}

fn run_delete(args: ProjectArgs) -> Result<i32> {
    let mut studio = open_studio(&args.data_dir, true)?;
    if !studio.delete_project(&args.project) {
        bail!("unknown project {}", args.project);
    }
    println!("Deleted project {}.", args.project);
    Ok(0)
}

fn run_walk(args: WalkArgs) -> Result<i32> {
    let mut studio = open_studio(&args.data_dir, args.dryrun)?;
    let project = studio
        .project(&args.project)
        .with_context(|| format!("unknown project {}", args.project))?;
    if project.concepts.is_empty() {
        bail!("project {} has no concepts to walk", args.project);
    }
    if args.concept == 0 || args.concept > project.concepts.len() {
        bail!(
            "concept {} out of range (project has {})",
            args.concept,
            project.concepts.len()
        );
    }
    let project_id = project.id.clone();
    let concept_id = project.concepts[args.concept - 1].id.clone();

    let mut walk = ConceptWalk::new(project_id.clone(), concept_id);
    println!(
        "Walking {}. Type /help for commands.",
        project.company_name
    );
    walk.enter(&mut studio)?;
    print_step(&studio, &project_id, &walk);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_walk_command(line.trim_end_matches(['\n', '\r'])) {
            WalkCommand::Noop => continue,
            WalkCommand::Quit => break,
            WalkCommand::Help => {
                for spec in WALK_COMMANDS {
                    println!("/{:<14} {}", spec.command, spec.help);
                }
            }
            WalkCommand::Next => {
                if walk.next(&mut studio)? {
                    print_step(&studio, &project_id, &walk);
                } else if walk.step_index() + 1 == STEPS.len() {
                    println!("Already at the final step.");
                } else {
                    println!(
                        "Not ready to move on: {}.",
                        gate_explanation(&studio, &project_id, &walk)
                    );
                }
            }
            WalkCommand::Back => {
                if walk.back(&mut studio)? {
                    print_step(&studio, &project_id, &walk);
                } else {
                    println!("Already at the first step.");
                }
            }
            WalkCommand::Goto(target) => match Step::resolve(&target) {
                Some(index) => {
                    if walk.jump(&mut studio, index)? {
                        print_step(&studio, &project_id, &walk);
                    } else {
                        println!(
                            "Not ready to move on: {}.",
                            gate_explanation(&studio, &project_id, &walk)
                        );
                    }
                }
                None => println!("Unknown step '{target}'. Steps are 1-7 or their names."),
            },
            WalkCommand::Regenerate => match step_slot(walk.step()) {
                Some(slot) => {
                    println!("Regenerating {}...", walk.step().title());
                    studio.generate_step_asset(&project_id, walk.concept_id(), slot)?;
                    print_step(&studio, &project_id, &walk);
                }
                None => println!("{} is text-only; nothing to regenerate.", walk.step().title()),
            },
            WalkCommand::Versions => match hero_slot(walk.step()) {
                Some(slot) => print_versions(&studio, &project_id, &walk, slot),
                None => println!("Only the mark and the vibe keep version history."),
            },
            WalkCommand::Select(position) => match hero_slot(walk.step()) {
                Some(slot) => {
                    let version_id = nth_visible_version(&studio, &project_id, &walk, slot, position);
                    match version_id {
                        Some(version_id) => {
                            studio.select_version(
                                &project_id,
                                walk.concept_id(),
                                slot,
                                &version_id,
                            )?;
                            println!("Version {position} is now active.");
                            print_step(&studio, &project_id, &walk);
                        }
                        None => println!("No version {position} here. Try /versions."),
                    }
                }
                None => println!("Only the mark and the vibe keep version history."),
            },
            WalkCommand::Concept(position) => {
                let Some(project) = studio.project(&project_id) else {
                    bail!("project {project_id} disappeared from the store");
                };
                if position == 0 || position > project.concepts.len() {
                    println!(
                        "Concept {position} out of range (project has {}).",
                        project.concepts.len()
                    );
                    continue;
                }
                let concept_id = project.concepts[position - 1].id.clone();
                walk.set_concept(concept_id);
                walk.enter(&mut studio)?;
                print_step(&studio, &project_id, &walk);
            }
            WalkCommand::Status => print_status(&studio, &project_id, &walk),
            WalkCommand::Unknown { command } => {
                println!("Unrecognized command '{command}'. Type /help.");
            }
        }
    }
    Ok(0)
}

fn step_slot(step: Step) -> Option<AssetSlot> {
    match step {
        Step::Mark => Some(AssetSlot::Logo),
        Step::Mood => Some(AssetSlot::MoodBoard),
        Step::Mockups => Some(AssetSlot::Mockups),
        Step::Social => Some(AssetSlot::Social),
        _ => None,
    }
}

fn hero_slot(step: Step) -> Option<AssetSlot> {
    match step {
        Step::Mark => Some(AssetSlot::Logo),
        Step::Mood => Some(AssetSlot::MoodBoard),
        _ => None,
    }
}

fn current_concept<'a>(studio: &'a Studio, project_id: &str, walk: &ConceptWalk) -> Option<&'a BrandConcept> {
    studio.store().concept(project_id, walk.concept_id())
}

fn print_step(studio: &Studio, project_id: &str, walk: &ConceptWalk) {
    let Some(concept) = current_concept(studio, project_id, walk) else {
        return;
    };
    let step = walk.step();
    println!();
    println!(
        "STEP {}/{}: {} ({})",
        walk.step_index() + 1,
        STEPS.len(),
        step.title(),
        concept.name
    );

    match step {
        Step::Mark => {
            println!("{}", concept.logo_concept);
            println!("Logo: {}", asset_label(&concept.logo_url));
        }
        Step::Typography => println!("{}", concept.typography),
        Step::Palette => {
            for color in &concept.color_palette {
                println!("{:<18} {:<8} {}", color.name, color.hex, color.usage);
            }
        }
        Step::Mood => {
            println!("{}", concept.mood_board);
            println!("Moodboard: {}", asset_label(&concept.mood_board_url));
        }
        Step::Mockups => {
            for kind in MockupKind::ALL {
                let state = concept
                    .mockups
                    .get(&kind)
                    .cloned()
                    .unwrap_or(AssetState::NotRequested);
                println!("{:<14} {}", kind.key(), asset_label(&state));
            }
        }
        Step::Social => {
            println!("{}", concept.social_strategy);
            for (index, post) in concept.campaigns.iter().enumerate() {
                let state = concept
                    .campaign_assets
                    .get(&(index as u32))
                    .cloned()
                    .unwrap_or(AssetState::NotRequested);
                println!(
                    "[{}] {:<10} {} - {}",
                    index + 1,
                    post.platform,
                    asset_label(&state),
                    post.caption
                );
            }
        }
        Step::Strategy => {
            println!("Mission: {}", concept.mission_vision.mission);
            println!("Vision:  {}", concept.mission_vision.vision);
            println!("Voice:   {}", concept.brand_voice.tone);
            for tagline in &concept.taglines {
                println!("Tagline: {tagline}");
            }
        }
    }
}

fn print_status(studio: &Studio, project_id: &str, walk: &ConceptWalk) {
    let Some(concept) = current_concept(studio, project_id, walk) else {
        return;
    };
    for (index, step) in STEPS.iter().enumerate() {
        let marker = if index == walk.step_index() { ">" } else { " " };
        let readiness = match step {
            Step::Mark => asset_label(&concept.logo_url),
            Step::Mood => asset_label(&concept.mood_board_url),
            Step::Mockups => mapping_summary(concept),
            Step::Social => format!(
                "{}/{} ready",
                concept
                    .campaign_assets
                    .values()
                    .filter(|state| state.is_ready())
                    .count(),
                concept.campaigns.len()
            ),
            _ => "ready".to_string(),
        };
        println!("{marker} {}. {:<14} {}", index + 1, step.title(), readiness);
    }
}

fn print_versions(studio: &Studio, project_id: &str, walk: &ConceptWalk, slot: AssetSlot) {
    let Some(concept) = current_concept(studio, project_id, walk) else {
        return;
    };
    let (history, active) = match slot {
        AssetSlot::Logo => (&concept.logo_history, &concept.logo_url),
        AssetSlot::MoodBoard => (&concept.mood_board_history, &concept.mood_board_url),
        _ => return,
    };
    let visible = visible_history(history);
    if visible.is_empty() {
        println!("No saved versions yet.");
        return;
    }
    for (index, version) in visible.iter().enumerate() {
        let marker = if active.payload() == Some(version.url.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}. {} ({} chars)",
            index + 1,
            format_created(version.timestamp),
            version.url.len()
        );
    }
}

fn nth_visible_version(
    studio: &Studio,
    project_id: &str,
    walk: &ConceptWalk,
    slot: AssetSlot,
    position: usize,
) -> Option<String> {
    let concept = current_concept(studio, project_id, walk)?;
    let history = match slot {
        AssetSlot::Logo => &concept.logo_history,
        AssetSlot::MoodBoard => &concept.mood_board_history,
        _ => return None,
    };
    visible_history(history)
        .get(position.checked_sub(1)?)
        .map(|version| version.id.clone())
}

fn gate_explanation(studio: &Studio, project_id: &str, walk: &ConceptWalk) -> String {
    let Some(concept) = current_concept(studio, project_id, walk) else {
        return "concept missing".to_string();
    };
    match walk.step() {
        Step::Mark => format!("logo is {}", asset_label(&concept.logo_url)),
        Step::Mood => format!("moodboard is {}", asset_label(&concept.mood_board_url)),
        Step::Mockups => "no mockups have landed yet".to_string(),
        _ => "this step is always ready".to_string(),
    }
}

fn asset_label(state: &AssetState) -> String {
    match state {
        AssetState::NotRequested => "not requested".to_string(),
        AssetState::Pending => "generating...".to_string(),
        AssetState::Failed => "failed (use /regen to retry)".to_string(),
        AssetState::Ready(url) => format!("ready ({} chars)", url.len()),
    }
}

fn mapping_summary(concept: &BrandConcept) -> String {
    let ready = concept
        .mockups
        .values()
        .filter(|state| state.is_ready())
        .count();
    let failed = concept
        .mockups
        .values()
        .filter(|state| state.is_failed())
        .count();
    if concept.mockups.is_empty() {
        return "not requested".to_string();
    }
    if failed > 0 {
        format!("{ready}/9 ready, {failed} failed")
    } else {
        format!("{ready}/9 ready")
    }
}

fn status_label(project: &Project) -> &'static str {
    use lumina_contracts::brand::ProjectStatus;
    match project.status {
        ProjectStatus::GeneratingText => "writing concept",
        ProjectStatus::GeneratingImages => "rendering assets",
        ProjectStatus::Complete => "complete",
        ProjectStatus::Error => "error",
    }
}

fn format_created(millis: u64) -> String {
    Local
        .timestamp_millis_opt(millis as i64)
        .single()
        .map(|when| when.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}
