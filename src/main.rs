use std::{process, sync::Arc};

use folio::{
    application::{
        auto_scrape::AutoScrapeController,
        catalog::{CatalogService, CatalogSettings},
        error::{AppError, error_chain},
        pagination::PageAccumulator,
    },
    cache::QueryOptions,
    config::{self, BrowseArgs, Command, ProductsArgs, ReviewArgs, ScrapeArgs, SearchArgs},
    domain::{CategoryId, ProductId, ScrapeTarget, auth::Credential},
    infra::{http::HttpCatalogRemote, telemetry},
    presentation::{self, print_json, print_lines},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        eprintln!("{}: {error}", error.presentation_message());
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let chain = error_chain(error);
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

struct Session {
    catalog: Arc<CatalogService>,
    credential: Option<Credential>,
    json: bool,
}

impl Session {
    fn emit<T: Serialize + ?Sized>(
        &self,
        value: &T,
        lines: impl FnOnce(&T) -> Vec<String>,
    ) -> Result<(), AppError> {
        if self.json {
            print_json(value)
        } else {
            print_lines(lines(value));
            Ok(())
        }
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let remote = Arc::new(HttpCatalogRemote::new(&settings.api)?);
    info!(
        base_url = %remote.base_url(),
        page_size = settings.pagination.page_size.get(),
        "Catalog client ready"
    );
    let catalog = Arc::new(CatalogService::new(
        remote,
        CatalogSettings::from(&settings),
    ));
    let session = Session {
        catalog,
        credential: cli_args.token.and_then(Credential::bearer),
        json: cli_args.json,
    };

    match cli_args.command {
        Command::Browse(args) => run_browse(&session, args).await,
        Command::Navigation => run_navigation(&session).await,
        Command::Categories { slug } => {
            let categories = session
                .catalog
                .navigation_categories(&slug, QueryOptions::default())
                .await?;
            session.emit(categories.as_slice(), |items| {
                items.iter().map(presentation::category_line).collect()
            })
        }
        Command::Products(args) => run_products(&session, args).await,
        Command::Product { id } => {
            let detail = session
                .catalog
                .product(&ProductId::new(id), QueryOptions::default())
                .await?;
            session.emit(detail.as_ref(), presentation::product_detail_lines)
        }
        Command::Related { id } => {
            let related = session
                .catalog
                .related_products(&ProductId::new(id), QueryOptions::default())
                .await?;
            session.emit(related.as_slice(), |items| {
                items.iter().map(presentation::product_line).collect()
            })
        }
        Command::Search(SearchArgs { query, page }) => {
            let window = session
                .catalog
                .search(&query, page, QueryOptions::default())
                .await?;
            session.emit(&window, presentation::page_lines)
        }
        Command::Favourites => {
            let favourites = session
                .catalog
                .favourites(session.credential.as_ref(), QueryOptions::default())
                .await?;
            session.emit(favourites.as_slice(), |items| {
                items.iter().map(presentation::favourite_line).collect()
            })
        }
        Command::Favourite { product_id } => {
            let ack = session
                .catalog
                .add_favourite(&ProductId::new(product_id), session.credential.as_ref())
                .await?;
            let line = presentation::favourite_ack_line(ack);
            session.emit(&serde_json::json!({ "status": line }), |_| {
                vec![line.to_string()]
            })
        }
        Command::Reviews { product_id } => {
            let reviews = session
                .catalog
                .reviews(
                    &ProductId::new(product_id),
                    session.credential.as_ref(),
                    QueryOptions::default(),
                )
                .await?;
            session.emit(reviews.as_slice(), |items| {
                items.iter().map(presentation::review_line).collect()
            })
        }
        Command::Review(ReviewArgs {
            product_id,
            rating,
            comment,
        }) => {
            let review = session
                .catalog
                .add_review(
                    &ProductId::new(product_id),
                    rating,
                    comment,
                    session.credential.as_ref(),
                )
                .await?;
            session.emit(&review, |review| vec![presentation::review_line(review)])
        }
        Command::Scrape(args) => run_scrape(&session, args).await,
    }
}

async fn run_navigation(session: &Session) -> Result<(), AppError> {
    let trees = session.catalog.navigation(QueryOptions::default()).await?;
    session.emit(trees.as_slice(), presentation::navigation_lines)
}

async fn run_browse(session: &Session, args: BrowseArgs) -> Result<(), AppError> {
    let target = scrape_target(args.category);
    let mut controller = AutoScrapeController::new(Arc::clone(&session.catalog), target);
    if let Some(url) = source_url(args.url.as_deref())? {
        controller = controller.with_source_url(url);
    }

    let state = Arc::new(controller)
        .spawn()
        .await
        .map_err(|err| AppError::unexpected(format!("auto-scrape task failed: {err}")))??;

    if !session.json {
        eprintln!("{}", presentation::scrape_state_line(&state));
    }
    match state.outcome() {
        Some(outcome) => {
            outcome?;
            run_navigation(session).await
        }
        None => Err(AppError::unexpected(format!(
            "auto-scrape stopped in non-terminal state `{state}`"
        ))),
    }
}

async fn run_products(session: &Session, args: ProductsArgs) -> Result<(), AppError> {
    let category_id = CategoryId(args.category_id);
    if !args.all {
        let window = session
            .catalog
            .category_products(category_id, args.page, QueryOptions::default())
            .await?;
        return session.emit(&window, presentation::page_lines);
    }

    let mut accumulator = PageAccumulator::new();
    while session
        .catalog
        .load_more(category_id, &mut accumulator)
        .await?
        .is_some()
    {}
    let items = accumulator.items();
    session.emit(items.as_slice(), |items| {
        items.iter().map(presentation::product_line).collect()
    })
}

async fn run_scrape(session: &Session, args: ScrapeArgs) -> Result<(), AppError> {
    let target = scrape_target(args.category);
    let url = source_url(args.url.as_deref())?;
    let outcome = session
        .catalog
        .trigger_scrape(target, url.as_ref())
        .await?;
    session.emit(&outcome, |outcome| {
        vec![presentation::scrape_outcome_line(outcome)]
    })
}

fn scrape_target(category: Option<i64>) -> ScrapeTarget {
    category
        .map(|id| ScrapeTarget::Category(CategoryId(id)))
        .unwrap_or(ScrapeTarget::Navigation)
}

fn source_url(raw: Option<&str>) -> Result<Option<Url>, AppError> {
    raw.map(|value| config::parse_http_url(value, "--url"))
        .transpose()
        .map_err(AppError::from)
}
