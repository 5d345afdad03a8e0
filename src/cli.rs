use std::path::PathBuf;

mod terminal;

use chrono::NaiveDate;
use clap::ArgAction;
use organigramma::{
    domain::{Level, Person, Qualification, UnitNode},
    storage::{Directory, Loaded},
    Chart, Unit, UnitCode,
};
use terminal::Colorize;
use tracing::instrument;

/// Parse a calendar date from a CLI argument.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{e}"))
}

/// Parse a unit code from a CLI argument.
fn parse_code(s: &str) -> Result<UnitCode, String> {
    s.parse().map_err(|e: organigramma::domain::CodeError| e.to_string())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn open(root: PathBuf) -> anyhow::Result<Directory<Loaded>> {
    Ok(Directory::new(root).load_all()?)
}

fn find_unit(chart: &Chart, code: &UnitCode) -> anyhow::Result<Unit> {
    chart
        .unit_by_code(code)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No unit with code {code}"))
}

fn find_level(chart: &Chart, name: &str) -> anyhow::Result<Level> {
    chart.levels().find_by_name(name).cloned().ok_or_else(|| {
        let known: Vec<_> = chart
            .levels()
            .iter()
            .map(|level| level.name.clone())
            .collect();
        anyhow::anyhow!("Unknown level '{name}' (known levels: {})", known.join(", "))
    })
}

/// Resolve a person from a query string: an id, a fiscal code, or a name in
/// either "Last First" or "First Last" order (case-insensitive).
fn find_person(chart: &Chart, query: &str) -> anyhow::Result<Person> {
    if let Ok(id) = query.parse::<uuid::Uuid>() {
        if let Some(person) = chart.person(id) {
            return Ok(person.clone());
        }
    }

    let needle = query.to_lowercase();
    let matches: Vec<_> = chart
        .people()
        .filter(|person| {
            person.full_name().to_lowercase() == needle
                || format!("{} {}", person.first_name, person.last_name).to_lowercase() == needle
                || person
                    .fiscal_code
                    .as_deref()
                    .is_some_and(|fc| fc.eq_ignore_ascii_case(query))
        })
        .cloned()
        .collect();

    match matches.as_slice() {
        [] => anyhow::bail!("No person matching '{query}'"),
        [person] => Ok(person.clone()),
        _ => anyhow::bail!("'{query}' is ambiguous, matched {} people", matches.len()),
    }
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global=true)]
    verbose: u8,

    /// The path to the root of the chart store
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Tree(Tree::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show the chart as of a date (default: today)
    Tree(Tree),

    /// Initialize a new chart store
    Init,

    /// Manage unit levels
    Level(LevelCmd),

    /// Manage professional qualifications
    Qualification(QualificationCmd),

    /// Manage people
    Person(PersonCmd),

    /// Create a new unit
    Add(Add),

    /// Move a unit under a different parent
    Move(Move),

    /// Change or clear who heads a unit
    Assign(Assign),

    /// Remove a unit and its whole subtree
    Remove(Remove),

    /// Show a unit's manager history
    History(History),

    /// Show detailed information about a unit
    Show(Show),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Tree(command) => command.run(root)?,
            Self::Init => Init::run(&root)?,
            Self::Level(command) => command.run(root)?,
            Self::Qualification(command) => command.run(root)?,
            Self::Person(command) => command.run(root)?,
            Self::Add(command) => command.run(root)?,
            Self::Move(command) => command.run(root)?,
            Self::Assign(command) => command.run(root)?,
            Self::Remove(command) => command.run(root)?,
            Self::History(command) => command.run(root)?,
            Self::Show(command) => command.run(root)?,
        }
        Ok(())
    }
}

struct Init;

impl Init {
    #[instrument]
    fn run(root: &PathBuf) -> anyhow::Result<()> {
        if root.join("config.toml").exists() {
            anyhow::bail!("Store already initialized (found existing config.toml)");
        }

        Directory::new(root.clone()).init()?;

        println!("Initialized chart store in {}", root.display());
        println!("  Created: config.toml");
        println!("  Created: levels/ qualifications/ people/ units/");
        println!();
        println!("Next steps:");
        println!("  org level add Direzione --order 1 --root-ok");
        println!("  org add \"Direzione Generale\" --level Direzione");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum TreeFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Default, clap::Parser)]
pub struct Tree {
    /// The date to materialize the chart on (YYYY-MM-DD, default today)
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: TreeFormat,

    /// Only show subtrees containing a unit whose name matches this regex
    #[arg(long)]
    filter: Option<String>,
}

impl Tree {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = open(root)?;
        let date = self.date.unwrap_or_else(today);

        let mut forest = directory.chart().resolve_tree(date);
        if let Some(pattern) = &self.filter {
            let re = regex::Regex::new(pattern)?;
            forest = prune(forest, &re);
        }

        match self.format {
            TreeFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&forest)?);
            }
            TreeFormat::Table => {
                if let Some(organization) = &directory.config().organization {
                    println!("{organization}");
                }
                println!("{}", format!("Chart on {date}").dim());
                println!();
                if forest.is_empty() {
                    println!("No units active on {date}.");
                }
                for (i, node) in forest.iter().enumerate() {
                    print_node(node, "", i + 1 == forest.len(), true);
                }
            }
        }
        Ok(())
    }
}

fn prune(nodes: Vec<UnitNode>, re: &regex::Regex) -> Vec<UnitNode> {
    nodes
        .into_iter()
        .filter_map(|mut node| {
            node.children = prune(std::mem::take(&mut node.children), re);
            (re.is_match(&node.name) || !node.children.is_empty()).then_some(node)
        })
        .collect()
}

fn print_node(node: &UnitNode, prefix: &str, is_last: bool, is_root: bool) {
    let connector = if is_root {
        ""
    } else if is_last {
        "└─ "
    } else {
        "├─ "
    };

    let code = node
        .code
        .as_ref()
        .map_or_else(|| "?".to_string(), ToString::to_string);
    let level = node.level.as_deref().unwrap_or("?");

    let manager = if terminal::is_narrow() {
        String::new()
    } else {
        node.manager.as_ref().map_or_else(
            || format!("  {}", "vacant".warning()),
            |snapshot| {
                let title = snapshot
                    .title
                    .as_ref()
                    .map_or_else(String::new, |t| format!(" ({t})"));
                format!("  {}", format!("{}{title}", snapshot.name).dim())
            },
        )
    };

    println!("{prefix}{connector}{} {} [{level}]{manager}", code.info(), node.name);

    let child_prefix = if is_root {
        String::new()
    } else if is_last {
        format!("{prefix}   ")
    } else {
        format!("{prefix}│  ")
    };
    for (i, child) in node.children.iter().enumerate() {
        print_node(child, &child_prefix, i + 1 == node.children.len(), false);
    }
}

#[derive(Debug, clap::Parser)]
pub struct LevelCmd {
    #[command(subcommand)]
    command: LevelCommand,
}

#[derive(Debug, clap::Parser)]
enum LevelCommand {
    /// Register a new level
    Add {
        /// Display name, e.g. "Direzione"
        name: String,

        /// Position in the hierarchy: lower is higher, 0 is the apex
        #[arg(long)]
        order: u32,

        /// Allow units of this level at the tree root
        #[arg(long = "root-ok")]
        can_be_root: bool,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,

        /// Names of levels admissible as parents (repeatable). When omitted,
        /// any level with a strictly lower order is admissible.
        #[arg(long = "parent")]
        parents: Vec<String>,
    },

    /// List registered levels
    List,
}

impl LevelCmd {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        match self.command {
            LevelCommand::Add {
                name,
                order,
                can_be_root,
                description,
                parents,
            } => {
                let mut level = Level::new(name, order, can_be_root);
                level.description = description;
                for parent_name in &parents {
                    let parent = find_level(directory.chart(), parent_name)?;
                    level.allowed_parents.insert(parent.id);
                }
                let name = level.name.clone();
                directory.add_level(level)?;
                println!("{}", format!("Added level {name} (order {order})").success());
            }
            LevelCommand::List => {
                for level in directory.chart().levels().iter() {
                    let root_marker = if level.can_be_root { " [root]" } else { "" };
                    let parents = if level.allowed_parents.is_empty() {
                        String::new()
                    } else {
                        let names: Vec<_> = level
                            .allowed_parents
                            .iter()
                            .filter_map(|id| directory.chart().levels().get(*id))
                            .map(|parent| parent.name.clone())
                            .collect();
                        format!("  parents: {}", names.join(", ")).dim()
                    };
                    println!("{:>3}  {}{root_marker}{parents}", level.order, level.name);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct QualificationCmd {
    #[command(subcommand)]
    command: QualificationCommand,
}

#[derive(Debug, clap::Parser)]
enum QualificationCommand {
    /// Register a new qualification
    Add {
        /// Display title, e.g. "Dirigente"
        title: String,

        /// The qualification carries executive rank
        #[arg(long)]
        executive: bool,
    },

    /// List registered qualifications
    List,
}

impl QualificationCmd {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        match self.command {
            QualificationCommand::Add { title, executive } => {
                let qualification = Qualification::new(title.clone(), executive);
                directory.add_qualification(qualification)?;
                println!("{}", format!("Added qualification {title}").success());
            }
            QualificationCommand::List => {
                for qualification in directory.chart().qualifications() {
                    let marker = if qualification.executive {
                        " [executive]"
                    } else {
                        ""
                    };
                    println!("{}{marker}", qualification.title);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct PersonCmd {
    #[command(subcommand)]
    command: PersonCommand,
}

#[derive(Debug, clap::Parser)]
enum PersonCommand {
    /// Register a new person
    Add {
        /// Given name
        first_name: String,

        /// Family name
        last_name: String,

        /// First day of employment (default today)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,

        /// Last day of employment, if already known
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,

        /// Italian fiscal code
        #[arg(long)]
        fiscal_code: Option<String>,

        /// Contact email
        #[arg(long)]
        email: Option<String>,

        /// Qualification title
        #[arg(long)]
        qualification: Option<String>,
    },

    /// List registered people
    List,
}

impl PersonCmd {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        match self.command {
            PersonCommand::Add {
                first_name,
                last_name,
                from,
                to,
                fiscal_code,
                email,
                qualification,
            } => {
                let mut person = Person::new(first_name, last_name, from.unwrap_or_else(today));
                person.employment.to = to;
                person.fiscal_code = fiscal_code;
                person.email = email;
                if let Some(title) = qualification {
                    let found = directory
                        .chart()
                        .qualifications()
                        .find(|q| q.title.eq_ignore_ascii_case(&title))
                        .ok_or_else(|| anyhow::anyhow!("Unknown qualification '{title}'"))?;
                    person.qualification = Some(found.id);
                }
                let name = person.full_name();
                directory.add_person(person)?;
                println!("{}", format!("Added {name}").success());
            }
            PersonCommand::List => {
                for person in directory.chart().people() {
                    let title = person
                        .qualification
                        .and_then(|id| directory.chart().qualification(id))
                        .map_or_else(String::new, |q| format!("  {}", q.title).dim());
                    let window = match (person.employment.from, person.employment.to) {
                        (Some(from), Some(until)) => format!("  {from} to {until}"),
                        (Some(from), None) => format!("  since {from}"),
                        _ => String::new(),
                    };
                    println!("{}{title}{}", person.full_name(), window.dim());
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Add {
    /// Display name of the new unit
    name: String,

    /// Level name
    #[arg(long)]
    level: String,

    /// Code of the parent unit; omit to create a root
    #[arg(long, value_parser = parse_code)]
    parent: Option<UnitCode>,

    /// First day of the unit's validity (default today)
    #[arg(long, value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Initial manager (name, fiscal code or id)
    #[arg(long)]
    manager: Option<String>,

    /// Organizational decree number
    #[arg(long)]
    ode: Option<u32>,

    /// Engineering registry number
    #[arg(long)]
    eng: Option<u32>,

    /// Public web page
    #[arg(long)]
    url: Option<String>,

    /// Effective date for the manager history (default today)
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
}

impl Add {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        let chart = directory.chart();

        let level = find_level(chart, &self.level)?;
        let mut unit = Unit::new(self.name.clone(), level.id, self.from.unwrap_or_else(today));
        if let Some(parent_code) = &self.parent {
            unit.parent = Some(find_unit(chart, parent_code)?.id);
        }
        if let Some(query) = &self.manager {
            unit.manager = Some(find_person(chart, query)?.id);
        }
        unit.ode_number = self.ode;
        unit.eng_number = self.eng;
        unit.url = self.url.clone();

        let outcome = directory.save_unit(unit, self.date.unwrap_or_else(today))?;
        println!(
            "{}",
            format!("Added {} with code {}", self.name, outcome.code).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Move {
    /// Code of the unit to move
    #[arg(value_parser = parse_code)]
    code: UnitCode,

    /// Code of the new parent unit
    #[arg(long, conflicts_with = "root_level", value_parser = parse_code)]
    to: Option<UnitCode>,

    /// Make the unit a root instead
    #[arg(long = "root-level")]
    root_level: bool,
}

impl Move {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        let chart = directory.chart();

        let mut unit = find_unit(chart, &self.code)?;
        unit.parent = if self.root_level {
            None
        } else {
            let to = self
                .to
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Provide --to <CODE> or --root-level"))?;
            Some(find_unit(chart, to)?.id)
        };

        let name = unit.name.clone();
        let outcome = directory.save_unit(unit, today())?;
        println!(
            "{}",
            format!("Moved {name}: {} is now {}", self.code, outcome.code).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Assign {
    /// Code of the unit
    #[arg(value_parser = parse_code)]
    code: UnitCode,

    /// New manager (name, fiscal code or id); omit with --vacant
    person: Option<String>,

    /// Leave the unit without a manager
    #[arg(long, conflicts_with = "person")]
    vacant: bool,

    /// Effective date of the change (default today)
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
}

impl Assign {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        let chart = directory.chart();

        let mut unit = find_unit(chart, &self.code)?;
        unit.manager = match (&self.person, self.vacant) {
            (Some(query), false) => Some(find_person(chart, query)?.id),
            (None, true) => None,
            _ => anyhow::bail!("Provide a person or --vacant"),
        };

        let effective = self.date.unwrap_or_else(today);
        let name = unit.name.clone();
        let outcome = directory.save_unit(unit, effective)?;

        match outcome.reconciled {
            Some(change) if !change.is_noop() => {
                if change.closed.is_some() {
                    println!("Closed the previous assignment.");
                }
                if change.opened.is_some() {
                    println!(
                        "{}",
                        format!("Assigned {name} effective {effective}").success()
                    );
                } else {
                    println!("{}", format!("{name} is vacant from {effective}").success());
                }
            }
            _ => println!("No change: {name} already had that manager."),
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Remove {
    /// Code of the unit to remove (with its whole subtree)
    #[arg(value_parser = parse_code)]
    code: UnitCode,

    /// Skip confirmation prompts
    #[arg(long, short)]
    yes: bool,
}

impl Remove {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut directory = open(root)?;
        let chart = directory.chart();

        let unit = find_unit(chart, &self.code)?;

        let mut subtree = Vec::new();
        let mut queue = vec![unit.id];
        while let Some(current) = queue.pop() {
            if let Some(found) = chart.unit(current) {
                subtree.push(found.clone());
                queue.extend(chart.children_of(current));
            }
        }

        if !self.yes {
            println!("Will remove {} unit(s) and their history:", subtree.len());
            for doomed in &subtree {
                let code = doomed
                    .code
                    .as_ref()
                    .map_or_else(|| "?".to_string(), ToString::to_string);
                println!("  {code} {}", doomed.name);
            }

            eprint!("\nProceed? (y/N) ");
            use std::io::{self, BufRead};
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            if !line.trim().eq_ignore_ascii_case("y") {
                println!("Cancelled");
                std::process::exit(130);
            }
        }

        let removed = directory.remove_unit(unit.id)?;
        println!("{}", format!("Removed {removed} unit(s)").success());
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct History {
    /// Code of the unit
    #[arg(value_parser = parse_code)]
    code: UnitCode,
}

impl History {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = open(root)?;
        let chart = directory.chart();

        let unit = find_unit(chart, &self.code)?;
        let history = chart.history(unit.id);

        println!("{} {}", self.code.to_string().info(), unit.name);
        if history.is_empty() {
            println!("No recorded assignments.");
            return Ok(());
        }
        for record in history {
            let person = chart
                .person(record.person)
                .map_or_else(|| record.person.to_string(), Person::full_name);
            let until = record
                .to
                .map_or_else(|| "open".to_string(), |to| to.to_string());
            println!("  {} {} {}", record.from, until.dim(), person);
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Show {
    /// Code of the unit
    #[arg(value_parser = parse_code)]
    code: UnitCode,

    /// The date to resolve the manager on (default today)
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,
}

impl Show {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let directory = open(root)?;
        let chart = directory.chart();
        let date = self.date.unwrap_or_else(today);

        let unit = find_unit(chart, &self.code)?;

        println!("{} {}", self.code.to_string().info(), unit.name);
        if let Some(level) = chart.levels().get(unit.level) {
            println!("  Level:    {}", level.name);
        }
        if let Some(parent_id) = unit.parent {
            if let Some(parent) = chart.unit(parent_id) {
                let code = parent
                    .code
                    .as_ref()
                    .map_or_else(|| "?".to_string(), ToString::to_string);
                println!("  Parent:   {code} {}", parent.name);
            }
        }
        match (unit.validity.from, unit.validity.to) {
            (Some(from), Some(until)) => println!("  Valid:    {from} to {until}"),
            (Some(from), None) => println!("  Valid:    since {from}"),
            (None, Some(until)) => println!("  Valid:    until {until}"),
            (None, None) => {}
        }
        match chart.manager_on(unit.id, date) {
            Some(snapshot) => {
                let title = snapshot
                    .title
                    .as_ref()
                    .map_or_else(String::new, |t| format!(" ({t})"));
                println!("  Manager:  {}{title}  (on {date})", snapshot.name);
            }
            None => println!("  Manager:  {}  (on {date})", "vacant".warning()),
        }
        if let Some(ode) = unit.ode_number {
            println!("  ODE:      {ode}");
        }
        if let Some(eng) = unit.eng_number {
            println!("  ENG:      {eng}");
        }
        if let Some(url) = &unit.url {
            println!("  URL:      {url}");
        }
        let children = chart.children_of(unit.id).len();
        if children > 0 {
            println!("  Children: {children}");
        }
        println!("  History:  {} assignment(s)", chart.history(unit.id).len());
        Ok(())
    }
}
