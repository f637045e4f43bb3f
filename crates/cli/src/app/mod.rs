mod shell;

use std::{io::Write as _, path::PathBuf, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::Parser as _;
use engine::{
    Expense, ExpenseForm, ExpenseSync, MemoryStore, RemoteStore, Session, SessionContext,
    SyncError,
    report::{self, MonthTotal},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::{
    client::RestStore,
    config::{AppConfig, Command, ShellLine},
    error::{AppError, Result},
    local_state::LocalState,
    notify::{self, Mutation},
};

const CHART_WIDTH: usize = 30;
const PASSWORD_ENV: &str = "GASTOS_PASSWORD";

enum Backend {
    Rest(Arc<RestStore>),
    Memory(Arc<MemoryStore>),
}

pub struct App {
    config: AppConfig,
    tz: Tz,
    backend: Backend,
    sync: ExpenseSync<Arc<dyn RemoteStore>>,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let tz = config.tz()?;

        let (backend, store, session) = if config.offline {
            let memory = Arc::new(MemoryStore::new());
            let auth = memory.register("offline");
            tracing::info!("offline mode, nothing is saved");
            let store: Arc<dyn RemoteStore> = memory.clone();
            (Backend::Memory(memory), store, Session::Authenticated(auth))
        } else {
            let rest = Arc::new(RestStore::new(&config.base_url, &config.anon_key)?);
            let store: Arc<dyn RemoteStore> = rest.clone();
            let session = match LocalState::load(&config.state_path)?.session {
                Some(auth) if auth.is_expired(Utc::now()) => {
                    tracing::warn!(user = %auth.user.id, "stored session expired");
                    Session::Anonymous
                }
                stored => Session::from(stored),
            };
            (Backend::Rest(rest), store, session)
        };

        let sync = ExpenseSync::new(store, SessionContext::new(session))
            .with_stale_time(config.stale_time());

        Ok(Self {
            config,
            tz,
            backend,
            sync,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        match command {
            Command::Shell => self.shell(&mut input).await,
            command => self.execute(command, &mut input).await,
        }
    }

    async fn shell<R: AsyncBufRead + Unpin>(&self, input: &mut Lines<R>) -> Result<()> {
        prompt()?;
        while let Some(line) = input.next_line().await? {
            let words = match shell::split_line(&line) {
                Ok(words) => words,
                Err(err) => {
                    eprintln!("{err}");
                    prompt()?;
                    continue;
                }
            };

            match words.first().map(String::as_str) {
                None => {}
                Some("exit" | "quit") => break,
                Some(_) => match ShellLine::try_parse_from(&words) {
                    Ok(ShellLine { command }) => {
                        if let Err(err) = self.execute(command, input).await {
                            eprintln!("{err}");
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                },
            }
            prompt()?;
        }
        Ok(())
    }

    async fn execute<R: AsyncBufRead + Unpin>(
        &self,
        command: Command,
        input: &mut Lines<R>,
    ) -> Result<()> {
        match command {
            Command::Login { email } => self.login(&email, input).await,
            Command::Logout => self.logout().await,
            Command::List => {
                let rows = self.sync.list().await?;
                for line in render_list(&rows, self.tz) {
                    println!("{line}");
                }
                Ok(())
            }
            Command::Add {
                description,
                amount,
                date,
            } => {
                let form = ExpenseForm {
                    description,
                    amount,
                    date: self.day(date),
                };
                let result = match form.validate() {
                    Ok(fields) => self.sync.add(&fields).await,
                    Err(err) => Err(err),
                };
                report_mutation(Mutation::Add, result)
            }
            Command::Edit {
                id,
                description,
                amount,
                date,
            } => {
                let rows = self.sync.list().await?;
                let current = rows
                    .iter()
                    .find(|row| row.id.as_str() == id)
                    .ok_or_else(|| AppError::Input(format!("gasto {id} não encontrado")))?;

                let mut form = ExpenseForm::from_expense(current);
                if let Some(description) = description {
                    form.description = description;
                }
                if let Some(amount) = amount {
                    form.amount = amount;
                }
                if let Some(date) = date {
                    form.date = start_of_day(date, self.tz);
                }
                let result = match form.validate() {
                    Ok(fields) => self.sync.edit(&current.id, &fields).await,
                    Err(err) => Err(err),
                };
                report_mutation(Mutation::Edit, result)
            }
            Command::Delete { id } => {
                let result = self.sync.delete(&id.into()).await;
                report_mutation(Mutation::Delete, result)
            }
            Command::Chart => {
                let rows = self.sync.list().await?;
                for line in render_chart(&report::monthly_totals(&rows, self.tz)) {
                    println!("{line}");
                }
                Ok(())
            }
            Command::Total => {
                let rows = self.sync.list().await?;
                let now = Utc::now().with_timezone(&self.tz);
                let total = report::month_total(&rows, &now);
                println!("Total do mês: {}", report::format_brl(total));
                Ok(())
            }
            Command::Export { output } => self.export(output).await,
            Command::Shell => Err(AppError::Input("já estamos no shell".to_string())),
        }
    }

    async fn login<R: AsyncBufRead + Unpin>(
        &self,
        email: &str,
        input: &mut Lines<R>,
    ) -> Result<()> {
        let auth = match &self.backend {
            Backend::Rest(rest) => {
                let password = read_password(input).await?;
                let auth = rest.sign_in_with_password(email, &password).await?;
                LocalState {
                    session: Some(auth.clone()),
                }
                .save(&self.config.state_path)?;
                auth
            }
            Backend::Memory(memory) => memory.register(email),
        };

        tracing::info!(user = %auth.user.id, "signed in");
        self.sync.clear_cache();
        self.sync.session().sign_in(auth);
        println!("Conectado como {email}");
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        if let Backend::Rest(rest) = &self.backend {
            // The local session goes away even if the server call fails.
            if let Err(err) = rest.sign_out(&self.sync.session().current()).await {
                tracing::warn!("sign out failed: {err}");
            }
            LocalState::default().save(&self.config.state_path)?;
        }
        self.sync.session().sign_out();
        self.sync.clear_cache();
        println!("Sessão encerrada");
        Ok(())
    }

    async fn export(&self, output: Option<PathBuf>) -> Result<()> {
        let rows = self.sync.list().await?;
        let now = Utc::now().with_timezone(&self.tz);
        let path = output.unwrap_or_else(|| PathBuf::from(report::report_file_name(&now)));
        let csv = report::export_csv(&rows, self.tz)?;
        std::fs::write(&path, csv)?;
        println!("Relatório salvo em {}", path.display());
        Ok(())
    }

    /// The given day, or today, at local midnight.
    fn day(&self, date: Option<NaiveDate>) -> DateTime<Utc> {
        let date = date.unwrap_or_else(|| Utc::now().with_timezone(&self.tz).date_naive());
        start_of_day(date, self.tz)
    }
}

fn report_mutation(mutation: Mutation, result: std::result::Result<(), SyncError>) -> Result<()> {
    let message = notify::message(mutation, &result);
    match result {
        Ok(()) => {
            println!("{message}");
            Ok(())
        }
        Err(_) => Err(AppError::Mutation(message)),
    }
}

async fn read_password<R: AsyncBufRead + Unpin>(input: &mut Lines<R>) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    eprint!("Senha: ");
    std::io::stderr().flush()?;
    input
        .next_line()
        .await?
        .map(|line| line.trim_end().to_string())
        .ok_or_else(|| AppError::Input("senha não informada".to_string()))
}

fn prompt() -> Result<()> {
    print!("gastos> ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Local midnight of `date`, or the first valid instant after it when
/// midnight is skipped by a DST change.
fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..3)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(hour)))
                .earliest()
        })
        .map_or_else(|| Utc.from_utc_datetime(&midnight), |local| local.with_timezone(&Utc))
}

fn render_list(rows: &[Expense], tz: Tz) -> Vec<String> {
    if rows.is_empty() {
        return vec!["Nenhum gasto encontrado".to_string()];
    }
    rows.iter()
        .map(|row| {
            format!(
                "{}  {}  {:>14}  {}",
                row.id,
                report::format_date(&row.date, tz),
                report::format_brl(row.amount),
                row.description
            )
        })
        .collect()
}

fn render_chart(buckets: &[MonthTotal]) -> Vec<String> {
    let max = buckets
        .iter()
        .map(|bucket| bucket.total.cents())
        .max()
        .unwrap_or(0);
    if max <= 0 {
        return vec!["Nenhum gasto encontrado".to_string()];
    }

    buckets
        .iter()
        .map(|bucket| {
            let cents = bucket.total.cents().max(0);
            // i128 so large totals cannot overflow the scaling.
            let width = (i128::from(cents) * CHART_WIDTH as i128 / i128::from(max)) as usize;
            format!(
                "{:>15} {:<width$} {}",
                bucket.month.to_string(),
                "█".repeat(width.max(1)),
                report::format_brl(bucket.total),
                width = CHART_WIDTH
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono_tz::America::Sao_Paulo;
    use engine::Amount;

    use super::*;

    fn offline() -> App {
        App::new(AppConfig {
            offline: true,
            ..AppConfig::default()
        })
        .unwrap()
    }

    fn no_input() -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(&b""[..]).lines()
    }

    #[test]
    fn day_starts_at_local_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            start_of_day(date, Sao_Paulo),
            Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn chart_bars_scale_to_the_largest_month() {
        let buckets = vec![
            MonthTotal {
                month: report::YearMonth { year: 2024, month: 2 },
                total: Amount::from_cents(1000),
            },
            MonthTotal {
                month: report::YearMonth { year: 2024, month: 1 },
                total: Amount::from_cents(500),
            },
        ];
        let lines = render_chart(&buckets);
        assert_eq!(lines[0].matches('█').count(), CHART_WIDTH);
        assert_eq!(lines[1].matches('█').count(), CHART_WIDTH / 2);
        assert!(lines[1].contains("janeiro/2024"));
        assert!(lines[1].ends_with("R$ 5,00"));
        assert_eq!(render_chart(&[]), vec!["Nenhum gasto encontrado"]);
    }

    #[tokio::test]
    async fn offline_commands_share_one_cache() {
        let app = offline();
        let mut input = no_input();

        app.execute(
            Command::Add {
                description: "Mercado".to_string(),
                amount: "10".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 5),
            },
            &mut input,
        )
        .await
        .unwrap();
        let rows = app.sync.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        let id = rows[0].id.to_string();

        app.execute(
            Command::Edit {
                id: id.clone(),
                description: None,
                amount: Some("20".to_string()),
                date: None,
            },
            &mut input,
        )
        .await
        .unwrap();
        let rows = app.sync.list().await.unwrap();
        assert_eq!(rows[0].amount, Amount::from_cents(2000));
        assert_eq!(rows[0].description, "Mercado");

        app.execute(Command::Delete { id }, &mut input).await.unwrap();
        assert!(app.sync.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_form_is_reported_without_a_write() {
        let app = offline();
        let err = app
            .execute(
                Command::Add {
                    description: "ab".to_string(),
                    amount: "10".to_string(),
                    date: None,
                },
                &mut no_input(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Erro ao adicionar gasto: A descrição deve ter no mínimo 3 caracteres"
        );
        assert!(app.sync.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn logout_drops_the_session() {
        let app = offline();
        app.execute(Command::Logout, &mut no_input()).await.unwrap();
        assert!(matches!(
            app.execute(Command::List, &mut no_input()).await,
            Err(AppError::Sync(SyncError::Unauthenticated))
        ));
    }

    #[tokio::test]
    async fn shell_runs_each_line() {
        let app = offline();
        let script: &[u8] = b"add --description 'Padaria do bairro' --amount 7.5 --date 2024-02-01
bogus
list
exit
add --description never --amount 1
";
        let mut input = BufReader::new(script).lines();

        app.shell(&mut input).await.unwrap();

        let rows = app.sync.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "Padaria do bairro");
        assert_eq!(rows[0].amount, Amount::from_cents(750));
    }
}
