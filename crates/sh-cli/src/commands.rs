//! Subcommand dispatch

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;
use serde::Serialize;
use serde_json::{json, Value};

use sh_db::{
    Database, DepartmentRepository, GroupRepository, ProfileRepository, RoleRepository,
};
use sh_models::{
    CredentialsUpdate, Group, MemberRole, Organization, Production, ProfileUpdate, Signup,
};

use crate::image;
use crate::Command;

#[derive(Debug, Subcommand)]
pub enum GroupCommand {
    /// Groups the signed-in user belongs to
    List,
    Create { name: String },
    /// Look up by slug or record id
    Show { slug_or_id: String },
    Rename { id: String, name: String },
    Delete { id: String },
    Members { id: String },
    AddMember {
        id: String,
        username: String,
        #[arg(long, default_value = "viewer")]
        role: String,
    },
    SetRole { member_id: String, role: String },
    RemoveMember { member_id: String },
    /// The signed-in user's role in a group
    MyRole { id: String },
}

#[derive(Debug, Subcommand)]
pub enum RoleCommand {
    List,
    ByDepartment { department_id: String },
    /// Roles assigned to the signed-in user
    Mine,
    Add {
        role_id: String,
        #[arg(long)]
        level: Option<String>,
    },
    Remove { person_role_id: String },
}

#[derive(Debug, Subcommand)]
pub enum DepartmentCommand {
    List,
    ForRole { role_id: String },
    /// Catalog roles listed under a department
    Catalog { department_id: String },
    /// Specializations of the signed-in user
    Mine,
    Add {
        department_id: String,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    Priority { specialization_id: String, priority: i64 },
    Remove { specialization_id: String },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    Credentials {
        #[arg(long)]
        current_password: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
    },
    UploadImage { path: PathBuf },
    DeleteImage { image_id: String },
    ActivateImage { image_id: String },
    AddEmail {
        email: String,
        #[arg(long)]
        primary: bool,
    },
    RemoveEmail { email: String },
    PrimaryEmail { email: String },
}

pub(crate) async fn run(db: &Database, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Ping => print_json(&json!({
            "state": db.connection_state().to_string(),
            "authenticated": db.is_authenticated(),
        })),
        Command::Signup {
            username,
            email,
            password,
        } => {
            let signed_in = db.signup(&Signup::new(username, email, password)).await?;
            print_json(&signed_in.user)
        }
        Command::Signin { username, password } => {
            let signed_in = db.signin(&username, &password).await?;
            print_json(&signed_in.user)
        }
        Command::Signout => {
            db.signout().await;
            print_json(&json!({ "signed_out": true }))
        }
        Command::Whoami => match db.current_user() {
            Some(user) => print_json(&user),
            None => anyhow::bail!("Not signed in"),
        },
        Command::Query { sql, vars } => {
            let vars: Value = match vars {
                Some(raw) => serde_json::from_str(&raw).context("--vars must be a JSON object")?,
                None => json!({}),
            };
            let results = db.query(&sql, vars).await?;
            print_json(&results.into_values())
        }
        Command::Organizations(cmd) => {
            run_group(GroupRepository::<Organization>::new(db.clone()), cmd).await
        }
        Command::Productions(cmd) => {
            run_group(GroupRepository::<Production>::new(db.clone()), cmd).await
        }
        Command::Roles(cmd) => run_roles(RoleRepository::new(db.clone()), cmd).await,
        Command::Departments(cmd) => {
            run_departments(DepartmentRepository::new(db.clone()), cmd).await
        }
        Command::Profile(cmd) => run_profile(ProfileRepository::new(db.clone()), cmd).await,
    }
}

async fn run_group<G: Group>(repo: GroupRepository<G>, cmd: GroupCommand) -> anyhow::Result<()> {
    match cmd {
        GroupCommand::List => print_json(&repo.list_for_current_user().await?),
        GroupCommand::Create { name } => print_json(&repo.create(&name).await?),
        GroupCommand::Show { slug_or_id } => match repo.get_by_slug_or_id(&slug_or_id).await? {
            Some(group) => print_json(&group),
            None => anyhow::bail!("{} not found: {}", G::TYPE_NAME, slug_or_id),
        },
        GroupCommand::Rename { id, name } => print_json(&repo.update(&id, &name).await?),
        GroupCommand::Delete { id } => print_json(&json!({ "deleted": repo.delete(&id).await? })),
        GroupCommand::Members { id } => {
            let members = repo.members(&id).await?;
            print_json(&members)
        }
        GroupCommand::AddMember { id, username, role } => {
            let role: MemberRole = role.parse()?;
            print_json(&repo.add_member(&id, &username, role).await?)
        }
        GroupCommand::SetRole { member_id, role } => {
            let role: MemberRole = role.parse()?;
            print_json(&repo.update_member_role(&member_id, role).await?)
        }
        GroupCommand::RemoveMember { member_id } => {
            print_json(&json!({ "removed": repo.remove_member(&member_id).await? }))
        }
        GroupCommand::MyRole { id } => print_json(&repo.current_role(&id).await?),
    }
}

async fn run_roles(repo: RoleRepository, cmd: RoleCommand) -> anyhow::Result<()> {
    match cmd {
        RoleCommand::List => print_json(&repo.all_roles().await?),
        RoleCommand::ByDepartment { department_id } => {
            print_json(&repo.roles_by_department(&department_id).await?)
        }
        RoleCommand::Mine => print_json(&repo.person_roles().await?),
        RoleCommand::Add { role_id, level } => {
            print_json(&repo.add_role_to_person(&role_id, level.as_deref()).await?)
        }
        RoleCommand::Remove { person_role_id } => print_json(&json!({
            "removed": repo.remove_role_from_person(&person_role_id).await?
        })),
    }
}

async fn run_departments(repo: DepartmentRepository, cmd: DepartmentCommand) -> anyhow::Result<()> {
    match cmd {
        DepartmentCommand::List => print_json(&repo.all_departments().await?),
        DepartmentCommand::ForRole { role_id } => {
            print_json(&repo.departments_for_role(&role_id).await?)
        }
        DepartmentCommand::Catalog { department_id } => {
            print_json(&repo.roles_for_department(&department_id).await?)
        }
        DepartmentCommand::Mine => print_json(&repo.specializations().await?),
        DepartmentCommand::Add {
            department_id,
            priority,
        } => print_json(&repo.add_specialization(&department_id, priority).await?),
        DepartmentCommand::Priority {
            specialization_id,
            priority,
        } => print_json(&repo.update_priority(&specialization_id, priority).await?),
        DepartmentCommand::Remove { specialization_id } => print_json(&json!({
            "removed": repo.remove_specialization(&specialization_id).await?
        })),
    }
}

async fn run_profile(repo: ProfileRepository, cmd: ProfileCommand) -> anyhow::Result<()> {
    match cmd {
        ProfileCommand::Show => print_json(&repo.get_profile().await?),
        ProfileCommand::Update {
            full_name,
            location,
        } => {
            let update = ProfileUpdate {
                full_name,
                location,
                ..Default::default()
            };
            print_json(&repo.update_profile(&update).await?)
        }
        ProfileCommand::Credentials {
            current_password,
            username,
            new_password,
        } => {
            let update = CredentialsUpdate {
                username,
                current_password,
                new_password,
            };
            print_json(&repo.update_credentials(&update).await?)
        }
        ProfileCommand::UploadImage { path } => {
            let data = image::data_url(&path)?;
            print_json(&repo.upload_profile_image(&data).await?)
        }
        ProfileCommand::DeleteImage { image_id } => print_json(&json!({
            "deleted": repo.delete_profile_image(&image_id).await?
        })),
        ProfileCommand::ActivateImage { image_id } => print_json(&json!({
            "active": repo.set_active_profile_image(&image_id).await?
        })),
        ProfileCommand::AddEmail { email, primary } => {
            print_json(&repo.add_email(&email, primary).await?)
        }
        ProfileCommand::RemoveEmail { email } => print_json(&repo.remove_email(&email).await?),
        ProfileCommand::PrimaryEmail { email } => {
            print_json(&repo.set_primary_email(&email).await?)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
