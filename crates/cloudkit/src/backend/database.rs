//! Database backend driving the `mysql` and `dropdb`/`createdb` clients.
//!
//! Passwords travel through `MYSQL_PWD`/`PGPASSWORD`, never the argument
//! list, so the clients neither prompt nor expose them in `ps`.

use crate::backend::Database;
use crate::error::{Error, Result};
use crate::types::{DatabaseKind, validate_database_name};
use std::io::ErrorKind;
use std::process::Command;

/// Server connection details
#[derive(Debug, Clone)]
pub struct DatabaseCli {
    kind: DatabaseKind,
    host: String,
    port: Option<u16>,
    user: String,
    password: String,
}

impl DatabaseCli {
    pub fn new(
        kind: DatabaseKind,
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            host: host.into(),
            port: None,
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Client invocations that recreate `name`, in order
    fn recreate_commands(&self, name: &str) -> Vec<(&'static str, Vec<String>)> {
        match self.kind {
            DatabaseKind::Mysql => {
                let mut args = vec![format!("-u{}", self.user), format!("-h{}", self.host)];
                if let Some(port) = self.port {
                    args.push(format!("-P{port}"));
                }
                args.extend(["-e".to_string(), mysql_recreate_statement(name)]);
                vec![("mysql", args)]
            }
            DatabaseKind::Postgresql => {
                let mut common = vec![
                    "-h".to_string(),
                    self.host.clone(),
                    "-U".to_string(),
                    self.user.clone(),
                ];
                if let Some(port) = self.port {
                    common.extend(["-p".to_string(), port.to_string()]);
                }
                let mut drop_args = common.clone();
                drop_args.extend(["--if-exists".to_string(), name.to_string()]);
                let mut create_args = common;
                create_args.extend(
                    ["-E", "UTF8", "-T", "template0", name]
                        .iter()
                        .map(|s| (*s).to_string()),
                );
                vec![("dropdb", drop_args), ("createdb", create_args)]
            }
        }
    }

    fn password_var(&self) -> &'static str {
        match self.kind {
            DatabaseKind::Mysql => "MYSQL_PWD",
            DatabaseKind::Postgresql => "PGPASSWORD",
        }
    }

    fn run(&self, program: &str, args: &[String]) -> Result<()> {
        let mut command = Command::new(program);
        command.args(args);
        if !self.password.is_empty() {
            command.env(self.password_var(), &self.password);
        }

        log::debug!("running {} against {}", program, self.host);
        let output = command.output().map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::ToolMissing {
                tool: program.to_string(),
            },
            _ => Error::Io(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::from_cli_output(program, &stderr));
        }
        Ok(())
    }
}

/// Statement recreating a MySQL database
pub fn mysql_recreate_statement(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {name}; CREATE DATABASE {name} CHARACTER SET utf8;")
}

impl Database for DatabaseCli {
    fn kind(&self) -> DatabaseKind {
        self.kind
    }

    fn recreate(&self, name: &str) -> Result<()> {
        validate_database_name(name)?;
        for (program, args) in self.recreate_commands(name) {
            self.run(program, &args)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_statement_drops_then_creates_utf8() {
        assert_eq!(
            mysql_recreate_statement("manila"),
            "DROP DATABASE IF EXISTS manila; CREATE DATABASE manila CHARACTER SET utf8;"
        );
    }

    #[test]
    fn mysql_password_stays_off_the_command_line() {
        for password in ["", "secret"] {
            let db = DatabaseCli::new(DatabaseKind::Mysql, "db.example.com", "root", password);
            let commands = db.recreate_commands("manila");
            assert_eq!(commands.len(), 1);
            let (program, args) = &commands[0];
            assert_eq!(*program, "mysql");
            assert_eq!(&args[..3], ["-uroot", "-hdb.example.com", "-e"]);
            assert!(args.iter().all(|a| !a.starts_with("-p")), "{args:?}");
        }
    }

    #[test]
    fn port_is_passed_to_each_client() {
        let mysql = DatabaseCli::new(DatabaseKind::Mysql, "db", "root", "").with_port(Some(3307));
        assert!(mysql.recreate_commands("manila")[0].1.contains(&"-P3307".to_string()));

        let pg = DatabaseCli::new(DatabaseKind::Postgresql, "db", "postgres", "pw")
            .with_port(Some(5433));
        let commands = pg.recreate_commands("manila");
        assert_eq!(commands[0].0, "dropdb");
        assert_eq!(commands[1].0, "createdb");
        for (_, args) in &commands {
            assert!(args.windows(2).any(|w| w == ["-p", "5433"]), "{args:?}");
        }
        assert_eq!(commands[1].1.last().map(String::as_str), Some("manila"));
    }

    #[test]
    fn rejects_unsafe_names_before_running_anything() {
        let db = DatabaseCli::new(DatabaseKind::Mysql, "127.0.0.1", "root", "secret");
        let err = db.recreate("x; DROP TABLE users").unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }
}
