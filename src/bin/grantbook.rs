//! Grantbook command-line tool.
//!
//! Inspects the grant catalog, previews and applies role templates, and edits
//! grants in an LMDB store.

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use grantbook::{
    catalog, groups, provision, reconcile, template, GrantError, GrantFilter, GrantGroup, GrantRow, LmdbStore,
    ReconcileRequest, ResourceRef, RoleGrantsExport, SortField, StoreConfig, StoreRead, Subject, SubjectGrantGroup,
    SubjectSpec, Subjects,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// LMDB environment directory
    #[arg(long, env = "GRANTBOOK_DB", default_value = "grantbook.db", global = true)]
    db: PathBuf,

    /// Memory map size in bytes
    #[arg(long, env = "GRANTBOOK_MAP_SIZE", global = true)]
    map_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the catalog of sections, items and actions
    Catalog {
        #[arg(long)]
        json: bool,
    },
    /// Built-in role templates
    #[command(subcommand)]
    Template(TemplateCmd),
    /// Show a subject's grants grouped for editing
    Groups(GroupsArgs),
    /// Role utilities
    #[command(subcommand)]
    Role(RoleCmd),
    /// Edit grants
    #[command(subcommand)]
    Grant(GrantCmd),
}

#[derive(Subcommand)]
enum TemplateCmd {
    List,
    Explain { name: String },
    /// Preview what applying a template would change
    Diff {
        name: String,
        #[arg(long)]
        json: bool,
    },
    Apply { name: String },
}

#[derive(Args)]
struct GroupsArgs {
    /// Role name or id
    #[arg(long, conflicts_with_all = ["user", "anyone"])]
    role: Option<String>,
    #[arg(long, conflicts_with = "anyone")]
    user: Option<i32>,
    #[arg(long)]
    anyone: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum RoleCmd {
    /// Export a role and its grant groups as JSON
    Export { name: String },
    /// Preview a role dump made by `role export` against the live role
    Load {
        name: String,
        file: PathBuf,
        /// Replace the role's grants with the dump's
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ResourceArgs {
    #[arg(long)]
    section: String,
    #[arg(long, default_value = "")]
    item: String,
    #[arg(long)]
    item_id: Option<i32>,
}

impl ResourceArgs {
    fn resource(&self) -> ResourceRef {
        ResourceRef::new(&self.section, &self.item, self.item_id)
    }
}

#[derive(Subcommand)]
enum GrantCmd {
    /// Set the active and disabled actions of one subject on one resource.
    /// Stored actions in neither list are deleted.
    Set {
        /// `user:ID`, `role:ID`, `role:NAME` or `anyone`. A number after `role:`
        /// is always an id.
        subject: String,
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(long, value_delimiter = ',')]
        active: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        disabled: Vec<String>,
    },
    /// List grants of every subject, grouped by subject and resource
    List(ListArgs),
    /// Create active grants for several subjects at once
    Bulk {
        /// Comma-separated subjects
        #[arg(value_delimiter = ',')]
        subjects: Vec<String>,
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(long, value_delimiter = ',', required = true)]
        actions: Vec<String>,
    },
}

#[derive(Args)]
struct ListArgs {
    #[arg(long)]
    section: Option<String>,
    #[arg(long)]
    item: Option<String>,
    #[arg(long)]
    item_id: Option<i32>,
    #[arg(long)]
    user: Option<i32>,
    /// Part of a role name
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    anyone: bool,
    #[arg(long)]
    active: Option<bool>,
    /// id, user, role, section, item or item_id
    #[arg(long, default_value = "id")]
    sort: SortField,
    #[arg(long)]
    desc: bool,
    #[arg(long)]
    json: bool,
}

impl ListArgs {
    fn filter(&self) -> GrantFilter {
        GrantFilter {
            section: self.section.clone(),
            item: self.item.clone(),
            item_id: self.item_id,
            user_id: self.user,
            role: self.role.clone(),
            anyone: self.anyone,
            active: self.active,
        }
    }
}

fn open_store(cli: &Cli) -> grantbook::Result<LmdbStore> {
    let mut cfg = StoreConfig::new(&cli.db);
    if let Some(size) = cli.map_size {
        cfg = cfg.with_map_size(size);
    }
    LmdbStore::open(&cfg)
}

fn parse_subject(store: &dyn StoreRead, s: &str) -> grantbook::Result<Subject> {
    s.parse::<SubjectSpec>()?.resolve(store)
}

fn join(names: impl Iterator<Item = String>) -> String {
    names.collect::<Vec<_>>().join(",")
}

fn print_groups(groups: &[GrantGroup]) {
    for g in groups {
        let id = g.item_id.map(|id| format!("#{}", id)).unwrap_or_default();
        let flag = if g.unsupported { " [unsupported]" } else { "" };
        println!("{}|{}{}{}  {}", g.section, g.item, id, flag, g.info);
        let mark = |a: &grantbook::GrantAction| {
            if a.unsupported {
                format!("{}!", a.name)
            } else {
                a.name.clone()
            }
        };
        println!("    have: {}", join(g.have.iter().map(mark)));
        println!("    disabled: {}", join(g.disabled.iter().map(mark)));
        println!("    available: {}", g.available.join(","));
    }
}

fn print_subject_groups(groups: &[SubjectGrantGroup]) {
    for g in groups {
        let who = match g.subject {
            Subject::Role(_) if !g.role_name.is_empty() => format!("role {}", g.role_name),
            s => s.to_string(),
        };
        let id = g.item_id.map(|id| format!("#{}", id)).unwrap_or_default();
        let actions = join(g.actions.iter().map(|a| if a.active { a.name.clone() } else { format!("({})", a.name) }));
        println!("{:<6} {:<20} {}|{}{}  {}  {}", g.id, who, g.section, g.item, id, actions, g.info);
    }
}

fn print_catalog() {
    println!("{:<14} {:<16} {:<8} Actions", "Section", "Item", "ItemID");
    for e in catalog::entries() {
        let item = if e.item.is_empty() { "*" } else { e.item };
        let req = if e.require_item_id { "yes" } else { "no" };
        println!("{:<14} {:<16} {:<8} {}", e.section, item, req, e.actions.join(","));
    }
}

fn print_diff(d: &template::TemplateDiff) {
    println!("Diff for template {:?}:", d.template);
    for r in &d.roles {
        println!("\nRole: {}", r.name);
        if r.status == template::RoleStatus::New {
            println!("  Status: New (Will be created)");
            continue;
        }
        if r.property_changes.is_empty() {
            println!("  Properties: Match");
        } else {
            println!("  Properties Update:");
            for ch in &r.property_changes {
                println!("    - {}", ch);
            }
        }
        println!("  Grants:");
        for g in &r.grants_added {
            println!("    + {}", g);
        }
        for g in &r.grants_removed {
            println!("    - {}", g);
        }
        if r.grants_added.is_empty() && r.grants_removed.is_empty() {
            println!("    (No Changes)");
        }
    }
    println!(
        "\n{} new, {} updated, {} matching; {} grants added, {} removed",
        d.new_roles, d.updated_roles, d.matching_roles, d.grants_added, d.grants_removed
    );
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Commands::Catalog { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(&catalog::export())?);
            } else {
                print_catalog();
            }
        }
        Commands::Template(TemplateCmd::List) => {
            println!("{:<18} Description", "Name");
            for name in template::template_names() {
                let t = template::require_template(name)?;
                println!("{:<18} {}", t.name, t.description);
            }
        }
        Commands::Template(TemplateCmd::Explain { name }) => {
            print!("{}", template::explain(template::require_template(name)?));
        }
        Commands::Template(TemplateCmd::Diff { name, json }) => {
            let t = template::require_template(name)?;
            let store = open_store(&cli)?;
            let diff = template::diff_template(&store, t)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print_diff(&diff);
            }
        }
        Commands::Template(TemplateCmd::Apply { name }) => {
            let t = template::require_template(name)?;
            let store = open_store(&cli)?;
            let report = template::apply_template(&store, t)?;
            println!(
                "Applied {:?}: created roles [{}], updated roles [{}], {} grants",
                t.name,
                report.created_roles.join(", "),
                report.updated_roles.join(", "),
                report.grants_created
            );
        }
        Commands::Groups(args) => {
            let store = open_store(&cli)?;
            let subject = match (&args.role, args.user) {
                (Some(role), _) => parse_subject(&store, &format!("role:{}", role))?,
                (None, Some(user)) => Subject::User(user),
                (None, None) if args.anyone => Subject::Anyone,
                (None, None) => return Err(GrantError::validation("one of --role, --user or --anyone is required").into()),
            };
            let groups = groups::build_for_subject(&store, subject)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&groups)?);
            } else {
                print_groups(&groups);
            }
        }
        Commands::Role(RoleCmd::Export { name }) => {
            let store = open_store(&cli)?;
            let export = grantbook::export_role_grants(&store, name)?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        Commands::Role(RoleCmd::Load { name, file, apply, json }) => {
            let dump: RoleGrantsExport = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            let store = open_store(&cli)?;
            let preview = grantbook::preview_role_grants(&store, name, &dump)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                let status = if preview.existing.is_some() { "existing" } else { "new" };
                println!("Role: {} ({})", preview.role, status);
                for ch in &preview.property_changes {
                    println!("  ~ {}", ch);
                }
                for g in &preview.grants_added {
                    println!("  + {}", g);
                }
                for g in &preview.grants_removed {
                    println!("  - {}", g);
                }
                for g in &preview.grants_toggled {
                    println!("  * {}", g);
                }
                if preview.is_unchanged() {
                    println!("  (No Changes)");
                }
            }
            if *apply {
                let report = grantbook::import_role_grants(&store, name, &dump)?;
                println!(
                    "Loaded {:?}: {} grants removed, {} created",
                    name, report.grants_removed, report.grants_created
                );
            }
        }
        Commands::Grant(GrantCmd::List(args)) => {
            let store = open_store(&cli)?;
            let mut rows = groups::search_grants(&store, &args.filter())?;
            groups::sort_subject_groups(&mut rows, args.sort, args.desc);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_subject_groups(&rows);
            }
        }
        Commands::Grant(GrantCmd::Set { subject, resource, active, disabled }) => {
            let store = open_store(&cli)?;
            let subject = parse_subject(&store, subject)?;
            let req = ReconcileRequest::new(subject, resource.resource())
                .with_active(active.iter().cloned())
                .with_disabled(disabled.iter().cloned());
            let report = reconcile::reconcile(&store, &req)?;
            println!(
                "created {}, activated {}, deactivated {}, deleted {}",
                report.created, report.activated, report.deactivated, report.deleted
            );
        }
        Commands::Grant(GrantCmd::Bulk { subjects, resource, actions }) => {
            let store = open_store(&cli)?;
            let mut selected = Subjects::default();
            for s in subjects {
                match parse_subject(&store, s)? {
                    Subject::User(id) => selected.user_ids.push(id),
                    Subject::Role(id) => selected.role_ids.push(id),
                    Subject::Anyone => selected.anyone = true,
                }
            }
            let row = GrantRow {
                section: resource.section.clone(),
                item: resource.item.clone(),
                item_id: resource.item_id,
                actions: actions.clone(),
            };
            let report = provision::provision(&store, &selected, &[row])?;
            println!("created {}, skipped {}", report.created, report.skipped);
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grantbook=info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(db = %cli.db.display(), "grantbook starting");
    run(cli)
}
