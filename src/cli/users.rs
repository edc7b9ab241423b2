use anyhow::Context;
use clap::Subcommand;
use rand::Rng;
use sqlx::PgPool;

use crate::auth::hash_password;
use crate::storage::{
    CreateUser, PostgresEventStore, PostgresUserStore, Role, SecurityAction, SecurityEvent,
    SecurityEventStore, UserStore,
};

/// User management subcommands
#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new user (verified immediately, no email round-trip)
    Create {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// First name
        #[arg(long)]
        first_name: Option<String>,

        /// Last name
        #[arg(long)]
        last_name: Option<String>,

        /// Password (if not provided, a random one will be generated)
        #[arg(short, long)]
        password: Option<String>,

        /// Make this user an admin
        #[arg(long)]
        admin: bool,
    },

    /// List all users
    List,

    /// Show user details
    Show {
        /// Username
        username: String,
    },

    /// Reset a user's password
    ResetPassword {
        /// Username
        #[arg(short, long)]
        username: String,

        /// New password (if not provided, a random one will be generated)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Suspend a user (prevent login)
    Suspend {
        /// Username
        #[arg(short, long)]
        username: String,
    },

    /// Activate a suspended user
    Activate {
        /// Username
        #[arg(short, long)]
        username: String,
    },

    /// Grant admin privileges to a user
    GrantAdmin {
        /// Username
        #[arg(short, long)]
        username: String,
    },

    /// Revoke admin privileges from a user
    RevokeAdmin {
        /// Username
        #[arg(short, long)]
        username: String,
    },

    /// Delete a user
    Delete {
        /// Username
        #[arg(short, long)]
        username: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

impl UserCommands {
    /// Execute the user command
    pub async fn execute(self, pool: PgPool) -> anyhow::Result<()> {
        let user_store = PostgresUserStore::new(pool.clone());
        let event_store = PostgresEventStore::new(pool);

        match self {
            UserCommands::Create {
                username,
                email,
                first_name,
                last_name,
                password,
                admin,
            } => {
                let password = password.unwrap_or_else(generate_secure_password);
                let password_hash =
                    hash_password(&password).context("Failed to hash password")?;

                let role = if admin { Role::Admin } else { Role::User };
                let user = user_store
                    .create_user(CreateUser {
                        username: username.clone(),
                        email: email.clone(),
                        password_hash,
                        first_name,
                        last_name,
                        role,
                        verification_token: None,
                    })
                    .await?;

                event_store
                    .log(SecurityEvent::new(SecurityAction::UserCreated)
                        .user(user.id, &user.username))
                    .await?;

                println!("✅ User created successfully!");
                println!();
                println!("   Username: {}", user.username);
                println!("   Email:    {}", user.email);
                println!("   Password: {}", password);
                println!("   Role:     {}", user.role.as_str());
                println!();
                println!("⚠️  Please securely share these credentials with the user.");
            }

            UserCommands::List => {
                let users = user_store.list_users().await?;

                if users.is_empty() {
                    println!("No users found.");
                    return Ok(());
                }

                println!(
                    "{:<36} {:<20} {:<30} {:<8} {:<8} {:<8}",
                    "ID", "Username", "Email", "Role", "Active", "Verified"
                );
                println!("{}", "-".repeat(114));

                for user in users {
                    println!(
                        "{:<36} {:<20} {:<30} {:<8} {:<8} {:<8}",
                        user.id,
                        truncate(&user.username, 18),
                        truncate(&user.email, 28),
                        user.role.as_str(),
                        if user.is_active { "Yes" } else { "No" },
                        if user.is_verified { "Yes" } else { "No" }
                    );
                }
            }

            UserCommands::Show { username } => {
                let user = user_store.get_user_by_username(&username).await?;

                println!("User Details:");
                println!("  ID:         {}", user.id);
                println!("  Username:   {}", user.username);
                println!("  Email:      {}", user.email);
                println!(
                    "  Name:       {} {}",
                    user.first_name.as_deref().unwrap_or(""),
                    user.last_name.as_deref().unwrap_or("")
                );
                println!("  Role:       {}", user.role.as_str());
                println!("  Active:     {}", if user.is_active { "Yes" } else { "No" });
                println!(
                    "  Verified:   {}",
                    if user.is_verified { "Yes" } else { "No" }
                );
                println!("  Created:    {}", user.created_at);
                println!(
                    "  Last Login: {}",
                    user.last_login
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "Never".to_string())
                );
            }

            UserCommands::ResetPassword { username, password } => {
                let user = user_store.get_user_by_username(&username).await?;
                let password = password.unwrap_or_else(generate_secure_password);
                let password_hash =
                    hash_password(&password).context("Failed to hash password")?;

                user_store.update_password(user.id, &password_hash).await?;
                event_store
                    .log(SecurityEvent::new(SecurityAction::UserPasswordReset)
                        .user(user.id, &user.username))
                    .await?;

                println!("✅ Password reset successfully!");
                println!();
                println!("   Username:     {}", user.username);
                println!("   New Password: {}", password);
                println!();
                println!("⚠️  Please securely share the new password with the user.");
            }

            UserCommands::Suspend { username } => {
                let user = user_store.get_user_by_username(&username).await?;
                user_store.set_user_active(user.id, false).await?;
                event_store
                    .log(SecurityEvent::new(SecurityAction::UserSuspended)
                        .user(user.id, &user.username))
                    .await?;

                println!("✅ User {} has been suspended.", username);
            }

            UserCommands::Activate { username } => {
                let user = user_store.get_user_by_username(&username).await?;
                user_store.set_user_active(user.id, true).await?;
                event_store
                    .log(SecurityEvent::new(SecurityAction::UserActivated)
                        .user(user.id, &user.username))
                    .await?;

                println!("✅ User {} has been activated.", username);
            }

            UserCommands::GrantAdmin { username } => {
                let user = user_store.get_user_by_username(&username).await?;
                user_store.set_user_role(user.id, Role::Admin).await?;

                println!("✅ Admin privileges granted to {}.", username);
            }

            UserCommands::RevokeAdmin { username } => {
                let user = user_store.get_user_by_username(&username).await?;
                user_store.set_user_role(user.id, Role::User).await?;

                println!("✅ Admin privileges revoked from {}.", username);
            }

            UserCommands::Delete { username, force } => {
                let user = user_store.get_user_by_username(&username).await?;

                if !force {
                    println!("Are you sure you want to delete user {}? (y/N)", username);
                    let mut input = String::new();
                    std::io::stdin().read_line(&mut input)?;
                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Cancelled.");
                        return Ok(());
                    }
                }

                user_store.delete_user(user.id).await?;
                event_store
                    .log(SecurityEvent::new(SecurityAction::UserDeleted)
                        .user(user.id, &user.username))
                    .await?;

                println!("✅ User {} has been deleted.", username);
            }
        }

        Ok(())
    }
}

/// Generate a secure random password
fn generate_secure_password() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%&*";
    let mut rng = rand::thread_rng();

    (0..16)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Truncate to a maximum number of characters, with ellipsis. Counts chars,
/// not bytes, so multibyte usernames and emails never split mid-character.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_strings_unchanged() {
        assert_eq!(truncate("alice", 18), "alice");
        assert_eq!(truncate("exactly-six", 11), "exactly-six");
    }

    #[test]
    fn test_truncate_long_strings_get_ellipsis() {
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let email = "郵便ポスト郵便ポスト@example.jp";
        let cut = truncate(email, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.ends_with("..."));
    }
}
