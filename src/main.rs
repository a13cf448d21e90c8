use axum::{
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use yaosearch_backend::config;
use yaosearch_backend::shard::registry::{InvalidateFn, LocalRegistry};

mod api;
mod auth;
mod cache;
mod db;
mod metrics;
mod queue;
mod state;

use cache::ResultCache;
use metrics::Metrics;
use queue::IngestQueue;
use state::AppState;

#[tokio::main]
async fn main() {
    // ASCII艺术logo
    println!(
        r#"
██╗   ██╗ █████╗  ██████╗ ███████╗███████╗ █████╗ ██████╗  ██████╗██╗  ██╗
╚██╗ ██╔╝██╔══██╗██╔═══██╗██╔════╝██╔════╝██╔══██╗██╔══██╗██╔════╝██║  ██║
 ╚████╔╝ ███████║██║   ██║███████╗█████╗  ███████║██████╔╝██║     ███████║
  ╚██╔╝  ██╔══██║██║   ██║╚════██║██╔══╝  ██╔══██║██╔══██╗██║     ██╔══██║
   ██║   ██║  ██║╚██████╔╝███████║███████╗██║  ██║██║  ██║╚██████╗██║  ██║
   ╚═╝   ╚═╝  ╚═╝ ╚═════╝ ╚══════╝╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝╚═╝  ╚═╝

分布式全文搜索服务 by ChuYao233
    "#
    );

    // 初始化日志 - INFO级别，紧凑格式
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .compact()
        .init();

    println!("🚀 服务器启动中...");

    // 加载配置
    let app_config = match config::init_config() {
        Ok(config) => config.read().clone(),
        Err(e) => {
            error!("配置加载失败: {}", e);
            panic!("Failed to load configuration: {}", e);
        }
    };

    // 确保数据目录和分片目录存在
    let data_dir = app_config.get_data_dir();
    let shard_dir = app_config.get_shard_dir();
    for dir in [&data_dir, &shard_dir] {
        if !dir.exists() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!("创建目录失败 {:?}: {}", dir, e);
                panic!("Failed to create directory: {}", e);
            }
        }
    }

    // 首次运行生成集群令牌
    let (api_token, generated) = match config::ensure_api_token() {
        Ok(result) => result,
        Err(e) => {
            error!("集群令牌初始化失败: {}", e);
            panic!("Failed to initialize api token: {}", e);
        }
    };
    if generated {
        println!("🔑 已生成集群令牌（保存在 config.json）：{}", api_token);
    }

    // 初始化节点数据库
    let pool = match SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&app_config.get_database_url())
        .await
    {
        Ok(pool) => {
            println!("📊 数据库连接成功");
            pool
        }
        Err(e) => {
            error!("数据库连接失败: {}", e);
            panic!("Failed to connect to database: {}", e);
        }
    };

    if let Err(e) = db::run_migrations(&pool).await {
        error!("数据库迁移失败: {}", e);
        panic!("Failed to run migrations: {}", e);
    }

    // 结果缓存与指标
    let metrics = Arc::new(Metrics::new());
    let cache = Arc::new(ResultCache::new(
        app_config.cache.enabled,
        app_config.cache.ttl_secs,
    ));

    // 分片写入提交后触发缓存失效
    let invalidate: InvalidateFn = {
        let cache = cache.clone();
        let metrics = metrics.clone();
        Arc::new(move || {
            cache.invalidate_all();
            metrics.add(&metrics.cache_invalidations, 1);
        })
    };

    // 分片注册表：对端表里的名称走远程存根，其余本地按需创建
    let registry = LocalRegistry::new(
        shard_dir,
        app_config.cluster.peers.clone(),
        Some(api_token.clone()),
        Some(invalidate),
    );

    let state = Arc::new(AppState {
        db: pool.clone(),
        registry: registry.clone(),
        queue: IngestQueue::new(pool),
        cache,
        metrics,
        primary_shard: app_config.search.primary_shard.clone(),
        query_shard: app_config.search.query_shard.clone(),
        api_token,
    });

    // 启动时应用主分片引导配置
    if let Some(bootstrap) = app_config.search.bootstrap.clone() {
        match registry.get_or_open(&state.primary_shard).await {
            Ok(primary) => {
                if let Err(e) = primary.configure(bootstrap).await {
                    error!("主分片引导配置失败: {}", e);
                } else {
                    println!("⚙️ 主分片 {} 引导配置已应用", state.primary_shard);
                }
            }
            Err(e) => error!("主分片打开失败: {}", e),
        }
    }

    // 启动摄入队列消费者
    queue::spawn_consumer(state.clone());

    // 配置CORS
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app = Router::new()
        .route("/api/health", get(api::health_check))
        .route("/api/index", post(api::index::index_documents))
        .route("/api/search", post(api::search::search))
        .route("/api/configure", post(api::admin::configure))
        .route("/api/stats", get(api::admin::stats))
        .route("/api/rpc/:shard/:op", post(api::rpc::dispatch))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        );

    // 启动服务器
    let addr = app_config.get_bind_address();
    println!("🌐 服务器监听地址: {}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("端口绑定失败 {}: {}", addr, e);
            panic!("Failed to bind address: {}", e);
        }
    };
    println!("✅ 服务器启动成功，等待连接...");
    if let Err(e) = axum::serve(listener, app).await {
        error!("服务器运行失败: {}", e);
    }
}
