use std::future::Future;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpServer;
use tracing_actix_web::TracingLogger;

use crate::abuse_filter::init_expiry_worker;
use crate::abuse_filter::Clock;
use crate::abuse_filter::FixedWindowLimiter;
use crate::abuse_filter::InMemoryStore;
use crate::abuse_filter::RateLimitStore;
use crate::abuse_filter::SystemClock;
use crate::configuration::MailchimpConfigError;
use crate::configuration::Settings;
use crate::domain::AgeBrackets;
use crate::mailchimp_client::MailchimpClient;
use crate::routes::health_check;
use crate::routes::method_not_allowed;
use crate::routes::subscribe;
use crate::transport_guard::OriginPolicy;

/// Wrapper for actix's `Server` with access to the bound port. Not to be
/// confused with actix's `App`!
pub struct Application {
    /// Left private; use `get_port` to access
    port: u16,
    server: Server,
    rate_limits: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    purge_interval: Duration,
}

impl Application {
    /// Bind the listener and assemble everything the handlers share.
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        // port 0 means "pick one"; tests need to know which
        let port = listener.local_addr()?.port();

        // missing credentials are reported per request, not fatal here
        let list_client = cfg.mailchimp.client();
        if let Err(e) = &list_client {
            tracing::warn!(error = %e, "list provider not configured; signups will fail");
        }

        let store: Arc<dyn RateLimitStore> = Arc::new(InMemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = FixedWindowLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            cfg.signup.rate_limit.max_requests,
            cfg.signup.rate_limit.window()?,
        );

        let policy = SignupPolicy {
            production: cfg.application.production,
            origins: OriginPolicy::from_settings(
                &cfg.signup.allowed_origins,
                cfg.application.production,
            ),
            honeypot_field: cfg.signup.honeypot_field.clone(),
            min_fill_time: cfg.signup.min_fill_time()?,
            age_brackets: cfg.signup.age_brackets.clone(),
            max_body_bytes: cfg.signup.max_body_bytes,
            limiter,
        };

        let server = run(listener, policy, ListClient(list_client))?;

        Ok(Self {
            port,
            server,
            rate_limits: store,
            clock,
            purge_interval: cfg.signup.rate_limit.purge_interval(),
        })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// The sweeper for this application's rate limit counters; spawn it next
    /// to `run_until_stopped`.
    pub fn expiry_worker(&self) -> impl Future<Output = Result<(), anyhow::Error>> {
        init_expiry_worker(
            Arc::clone(&self.rate_limits),
            Arc::clone(&self.clock),
            self.purge_interval,
        )
    }

    /// Because this consumes `self`, this should be the final function call (or
    /// passed to `tokio::spawn`)
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Everything the signup pipeline needs besides the list client. Built once,
/// shared by all workers.
pub struct SignupPolicy {
    pub production: bool,
    pub origins: OriginPolicy,
    pub honeypot_field: String,
    pub min_fill_time: chrono::Duration,
    pub age_brackets: AgeBrackets,
    /// Read by the handler itself, after the cheaper checks have passed.
    pub max_body_bytes: usize,
    pub limiter: FixedWindowLimiter,
}

/// The list client, or the reason there isn't one. Checked by the handler on
/// every request.
pub struct ListClient(pub Result<MailchimpClient, MailchimpConfigError>);

/// The server is not responsible for binding to an address, it only listens to
/// an already bound address.
///
/// Declares all API endpoints.
pub fn run(
    listener: TcpListener,
    policy: SignupPolicy,
    list_client: ListClient,
) -> Result<Server, anyhow::Error> {
    // `Data` is an `Arc`; every worker gets a clone of the same policy, so the
    // rate limiter is shared process-wide
    let policy = Data::new(policy);
    let list_client = Data::new(list_client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/api/subscribe")
                    .route(web::post().to(subscribe))
                    .default_service(web::to(method_not_allowed))
                    // success or failure, signup responses must never be cached
                    .wrap(DefaultHeaders::new().add((header::CACHE_CONTROL, "no-store"))),
            )
            .app_data(policy.clone())
            .app_data(list_client.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
