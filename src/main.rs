use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decanter::{
    Application, Body, Config, Cookie, PatternError, Server, Validator, abort, load_config,
    redirect, static_file,
};

const CONFIG_PATH: &str = "config.yaml";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decanter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = if Path::new(CONFIG_PATH).exists() {
        load_config(CONFIG_PATH)?
    } else {
        tracing::info!(path = CONFIG_PATH, "no config file, using defaults");
        Config::default()
    };

    let app = Arc::new(Application::from_config(&config));
    register_demo_routes(&app, &config).context("registering routes")?;
    tracing::info!(routes = app.router().len(), debug = app.debug(), "application ready");

    let mut server = Server::new(Arc::clone(&app), config.server.clone())
        .context("binding server socket")?;
    server.run()?;
    Ok(())
}

fn register_demo_routes(app: &Application, config: &Config) -> Result<(), PatternError> {
    app.route("/", |_, _, _| Ok(Body::from("Hello World!")))?;

    app.route("/hello/:name", |_, _, params| {
        Ok(Body::from(format!("Hello {}!", params.get("name").unwrap_or("stranger"))))
    })?;

    app.route(
        "/number/:n#[0-9]+#",
        Validator::new().coerce::<u64>("n").wrap(|_, _, params| {
            Ok(Body::from(format!("Your number is {}", params.get("n").unwrap_or("?"))))
        }),
    )?;

    app.route("/private", |req, _, _| {
        if req.query().get_str("password") != Some("secret") {
            return Err(abort(401, "Go away!"));
        }
        Ok(Body::from("Welcome!"))
    })?;

    app.route("/old", |_, res, _| Err(redirect(res, "/")))?;

    app.route("/counter", |req, res, _| {
        let count = req
            .cookie("counter")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        res.set_cookie(Cookie::new("counter", &count.to_string()).path("/"));
        res.set_content_type("text/plain");
        Ok(Body::from(format!("You have been here {} times", count)))
    })?;

    app.post("/echo", |req, res, _| {
        let form = req.form()?;
        res.set_content_type("text/plain");
        let mut names: Vec<&str> = form.iter().map(|(name, _)| name).collect();
        names.sort_unstable();
        Ok(Body::from(names.join(",")))
    })?;

    if let Some(root) = config.static_root.clone() {
        app.route("/static/:path#.+#", move |_, res, params| {
            Err(static_file(res, params.get("path").unwrap_or(""), &root))
        })?;
    }
    Ok(())
}
