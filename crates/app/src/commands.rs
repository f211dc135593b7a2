use std::{fmt::Write as _, sync::Arc};

use api_types::{
    Currency, SortOrder,
    chart::{CategoryTotal, ChannelTotal, category_label, channel_label},
    expense::ExpenseRecord,
};
use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use engine::{
    ChartFilters, EngineError, ExpenseDraft, ExpenseFilters, ExpensesView, MonthOption,
    QueryClient, Region, SummaryQuery, SummaryView, Transport, format_currency, last_12_months,
    rating, savings_percent,
};

use crate::{auth::Auth, error::Result};

const BAR_WIDTH: usize = 30;
const NO_DATA: &str = "No Data\n";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// The last twelve months, newest first.
    Months,
    /// Income, outflows, savings and net position of a month.
    Summary {
        /// Month as YYYY-MM (defaults to the current one).
        #[arg(long)]
        month: Option<String>,
    },
    /// Entries of a month, page by page.
    List(ListArgs),
    /// Spending breakdown of a month.
    Chart {
        #[arg(value_enum)]
        kind: ChartKind,
        #[arg(long)]
        month: Option<String>,
    },
    /// Record a new entry.
    Add(AddArgs),
    /// Who is logged in, with roles and token expiry.
    Whoami,
    /// Print the login URL of the identity provider.
    Login {
        #[arg(long, default_value = "http://localhost:5173/my/dashboard")]
        redirect_uri: String,
    },
    /// End the session.
    Logout,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ChartKind {
    Category,
    Channel,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    month: Option<String>,
    #[arg(long, default_value_t = 10)]
    limit: u32,
    #[arg(long, default_value = "DESC")]
    order: SortOrder,
    /// Free-text search.
    #[arg(long)]
    query: Option<String>,
    /// How many pages to load at most.
    #[arg(long, default_value_t = 1)]
    pages: usize,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    amount: Option<f64>,
    /// YYYY-MM-DD, defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    #[arg(long = "type", default_value = "expense")]
    entry_type: String,
    /// Defaults to the currency of the region.
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// First day of the statement month, for credit card spending.
    #[arg(long)]
    billing_month: Option<NaiveDate>,
}

/// Everything a command needs.
pub struct Context<T> {
    pub client: QueryClient<T>,
    pub auth: Arc<Auth>,
    pub region: Region,
    pub today: NaiveDate,
}

impl<T> Context<T> {
    fn month(&self, month: Option<&str>) -> Result<MonthOption> {
        match month {
            Some(month) => MonthOption::parse(month).ok_or_else(|| {
                crate::error::AppError::Setting(format!("invalid month {month:?}, expected YYYY-MM"))
            }),
            None => Ok(MonthOption::containing(self.today)),
        }
    }
}

pub async fn run<T: Transport>(command: Command, ctx: &Context<T>) -> Result<()> {
    let currency = ctx.region.currency();
    match command {
        Command::Months => {
            for option in last_12_months(ctx.today) {
                println!(
                    "{}  {:<9} {} .. {}",
                    option.month, option.label, option.start, option.end
                );
            }
        }
        Command::Summary { month } => {
            let month = ctx.month(month.as_deref())?;
            let query = SummaryQuery {
                month: month.month.clone(),
                currency,
            };
            let view = ctx.client.summary(&query).await;
            print!("{}", render_summary(&month, &view, currency));
        }
        Command::List(args) => list(args, ctx).await?,
        Command::Chart { kind, month } => {
            let month = ctx.month(month.as_deref())?;
            let filters = ChartFilters {
                start: month.start,
                end: month.end,
                currency,
            };
            let out = match kind {
                ChartKind::Category => chart_output(
                    ctx.client.category_chart(&filters).await,
                    currency,
                    render_category_chart,
                ),
                ChartKind::Channel => chart_output(
                    ctx.client.channel_chart(&filters).await,
                    currency,
                    render_channel_chart,
                ),
            };
            print!("{out}");
        }
        Command::Add(args) => add(args, ctx).await?,
        Command::Whoami => whoami(ctx).await?,
        Command::Login { redirect_uri } => {
            println!("{}", ctx.auth.login_url(&redirect_uri)?);
        }
        Command::Logout => {
            ctx.auth.logout().await?;
            println!("Logged out.");
        }
    }
    Ok(())
}

async fn list<T: Transport>(args: ListArgs, ctx: &Context<T>) -> Result<()> {
    let month = ctx.month(args.month.as_deref())?;
    let filters = ExpenseFilters {
        q: args.query,
        order: Some(args.order),
        limit: Some(args.limit),
        start: Some(month.start),
        end: Some(month.end),
        currency: Some(ctx.region.currency()),
    };

    let view = observed_pages(&ctx.client, &filters, args.pages).await?;
    for record in &view.items {
        println!("{}", render_row(record));
    }
    println!(
        "{} of {} entries, page {} of {}{}",
        view.items.len(),
        view.meta.total,
        view.meta.page,
        view.meta.page_count,
        if view.has_next_page { " (more available)" } else { "" }
    );
    Ok(())
}

async fn add<T: Transport>(args: AddArgs, ctx: &Context<T>) -> Result<()> {
    let draft = ExpenseDraft {
        title: args.title,
        amount: args.amount,
        date: Some(args.date.unwrap_or(ctx.today)),
        entry_type: Some(args.entry_type),
        currency: Some(
            args.currency
                .unwrap_or_else(|| ctx.region.currency().as_str().to_string()),
        ),
        channel: args.channel,
        category: args.category,
        notes: args.notes,
        billing_month: args.billing_month,
    };

    match ctx.client.create_expense(&draft).await {
        Ok(stale) => {
            println!("Entry saved, {} cached queries marked stale.", stale.len());
            Ok(())
        }
        Err(EngineError::Validation(errors)) => {
            for err in errors.errors() {
                eprintln!("{:>13}: {}", err.field.as_str(), err.message);
            }
            Err(EngineError::Validation(errors).into())
        }
        Err(err) => Err(err.into()),
    }
}

async fn whoami<T>(ctx: &Context<T>) -> Result<()> {
    if !ctx.auth.is_authenticated().await {
        println!("Not logged in.");
        return Ok(());
    }
    let claims = ctx.auth.claims().await.unwrap_or_default();
    match ctx.auth.load_user_profile().await {
        Ok(profile) => {
            let name = [profile.first_name, profile.last_name]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "{} {}",
                profile.username.or(claims.preferred_username).unwrap_or_default(),
                name
            );
            if let Some(email) = profile.email {
                println!("email: {email}");
            }
        }
        Err(err) => {
            tracing::warn!("could not load profile: {err}");
            println!("{}", claims.preferred_username.unwrap_or_default());
            if let Some(email) = claims.email {
                println!("email: {email}");
            }
        }
    }
    println!("realm roles: {}", ctx.auth.realm_roles().await.join(", "));
    for (client, roles) in ctx.auth.client_roles().await {
        println!("{client} roles: {}", roles.join(", "));
    }
    match ctx.auth.expires_at().await {
        Some(at) => println!("token expires at {at}"),
        None => println!("token carries no expiry"),
    }
    Ok(())
}

pub fn render_row(record: &ExpenseRecord) -> String {
    format!(
        "{}  {:<24} {:>14}  {:<8} {:<16} {}",
        record.date,
        record.title,
        format_currency(record.amount, record.currency, 2),
        record.entry_type.label(),
        record.channel.label(),
        record.category.label()
    )
}

pub fn render_summary(month: &MonthOption, view: &SummaryView, currency: Currency) -> String {
    let agg = &view.aggregate;
    let money = |amount| format_currency(amount, currency, 2);
    let mut out = String::new();

    let _ = writeln!(out, "{}", month.label);
    if view.degraded {
        let _ = writeln!(out, "(summary unavailable, showing zeros)");
    }
    let _ = writeln!(out, "Income          {:>16}  incl. remittances", money(agg.income));
    let _ = writeln!(out, "Outflows        {:>16}  Expenses + Bills, excl CC", money(agg.expense));
    let savings = match savings_percent(agg) {
        Some(percent) => format!("{} ({percent:.2}%)", money(agg.savings)),
        None => money(agg.savings),
    };
    let _ = writeln!(out, "Savings (Est.)  {savings:>16}  Income - Outflows");
    let _ = writeln!(
        out,
        "Net Position    {:>16}  {}",
        money(agg.net_position),
        rating(agg).label()
    );
    let _ = writeln!(
        out,
        "Potential next month CC bill: {}",
        money(agg.potential_next_month_cc_bill)
    );
    out
}

/// Loads up to `pages` pages while the list counts as observed. The
/// observation ends whether or not the loading succeeds.
async fn observed_pages<T: Transport>(
    client: &QueryClient<T>,
    filters: &ExpenseFilters,
    pages: usize,
) -> std::result::Result<ExpensesView, EngineError> {
    let key = client.observe_expenses(filters).await;
    let loaded = async {
        let mut view = client.expenses(filters).await?;
        while view.has_next_page && view.pages_loaded < pages {
            view = client.fetch_next_page(filters).await?;
        }
        Ok::<_, EngineError>(view)
    }
    .await;
    client.unobserve(&key).await;
    loaded
}

/// A chart that cannot be read shows the same empty state as one with no rows.
fn chart_output<R>(
    fetched: std::result::Result<Vec<R>, EngineError>,
    currency: Currency,
    render: fn(&[R], Currency) -> String,
) -> String {
    match fetched {
        Ok(totals) => render(&totals, currency),
        Err(err) => {
            tracing::warn!("chart unavailable: {err}");
            NO_DATA.to_string()
        }
    }
}

fn bar(total: f64, max: f64) -> String {
    if !(max > 0.0) || !total.is_finite() {
        return String::new();
    }
    let width = ((total / max) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64);
    "#".repeat(width as usize)
}

pub fn render_category_chart(totals: &[CategoryTotal], currency: Currency) -> String {
    if totals.is_empty() {
        return NO_DATA.to_string();
    }
    let max = totals.iter().map(|t| t.total).fold(0.0, f64::max);
    let mut out = String::new();
    for total in totals {
        let _ = writeln!(
            out,
            "{:<20} {:<30} {}",
            category_label(&total.category),
            bar(total.total, max),
            format_currency(total.total, currency, 2)
        );
        for part in total.breakdown.iter().flatten() {
            let _ = writeln!(
                out,
                "    {:<16} {}",
                category_label(&part.category),
                format_currency(part.total, currency, 2)
            );
        }
    }
    out
}

pub fn render_channel_chart(totals: &[ChannelTotal], currency: Currency) -> String {
    if totals.is_empty() {
        return NO_DATA.to_string();
    }
    let max = totals.iter().map(|t| t.total).fold(0.0, f64::max);
    let mut out = String::new();
    for total in totals {
        let _ = writeln!(
            out,
            "{:<20} {:<30} {}",
            channel_label(&total.channel),
            bar(total.total, max),
            format_currency(total.total, currency, 2)
        );
        for part in total.breakdown.iter().flatten() {
            let _ = writeln!(
                out,
                "    {:<16} {}",
                channel_label(&part.channel),
                format_currency(part.total, currency, 2)
            );
        }
    }
    out
}
