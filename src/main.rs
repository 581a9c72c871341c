// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 演示服务器
//!
//! 使用 `webengine` 库启动一个 HTTP/1 服务：
//! - `/web/*` 映射到配置的静态根目录
//! - `POST /api/login`、`POST /api/logout` 登录与登出
//! - `GET /api/profile` 需要认证，返回当前会话信息
//! - 标准输入上的管理指令：`stop`、`status`、`help`

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
    sync::Notify,
};

use webengine::{
    login_handler, logout_handler, serve, Config, HttpRequestMethod::*, RouteRegistry, Server,
    SessionStore, StaticAuthenticator,
};

fn main() {
    // 1. 日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 运行参数
    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    // 3. 根据配置分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return;
        }
    };
    runtime.block_on(run(config));
}

fn build_routes(config: &Config, sessions: &Arc<SessionStore>) -> RouteRegistry {
    let mut routes = RouteRegistry::new();
    let authenticator = Arc::new(StaticAuthenticator::new(config.credentials().clone()));
    let web_index = format!("{}index.html", config.web_prefix());

    let registrations = [
        routes.register(Post, "/api/login", login_handler(authenticator, Arc::clone(sessions))),
        routes.register(Post, "/api/logout", logout_handler(Arc::clone(sessions))),
        routes.register(Get, "/api/profile", |ctx, mut res| {
            let session = ctx.session();
            res.json(&json!({
                "session": session.map(|s| s.id()),
                "ip": ctx.remote_ip(),
                "user": session
                    .and_then(|s| s.token())
                    .and_then(|t| t.basic_credential.as_deref()),
            }));
            res.complete(200);
        }),
        routes.register(Get, "/", move |_, mut res| {
            res.header("Location", &web_index);
            res.complete(302);
        }),
    ];
    let failed = registrations.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!("{}个路由注册失败", failed);
    }

    routes.set_secured(true, &[Get], "/api/*");
    routes.set_secured(true, &[Post], "/api/logout");
    info!("已注册{}个路由", routes.len());
    routes
}

async fn run(config: Config) {
    let sessions = Arc::new(SessionStore::new());
    let routes = build_routes(&config, &sessions);

    // 监听全地址 (0.0.0.0) 或本地回环 (127.0.0.1)
    let port = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let listener = match TcpListener::bind(SocketAddrV4::new(address, port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            return;
        }
    };
    info!("端口{}绑定完成", port);

    let server = Arc::new(Server::new(config, routes, sessions));
    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicU32::new(0));

    // 后台管理控制台，不阻塞监听循环
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        let active_connection = Arc::clone(&active_connection);
        let server = Arc::clone(&server);
        async move {
            let mut reader = BufReader::new(tokio::io::stdin());
            let mut input = String::new();
            loop {
                input.clear();
                match reader.read_line(&mut input).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                match input.trim() {
                    "stop" => {
                        println!("停机指令已激活，服务器将停止接受新连接...");
                        shutdown.notify_one();
                        break;
                    }
                    "help" => {
                        println!("== webengine Help ==");
                        println!("stop   - 发出停机信号");
                        println!("status - 查看当前服务器运行状态");
                        println!("help   - 显示此帮助信息");
                        println!("====================");
                    }
                    "status" => {
                        println!("== webengine 状态 ==");
                        println!("当前活跃连接数: {}", active_connection.load(Ordering::Relaxed));
                        println!("当前会话数: {}", server.sessions().len());
                        println!("====================");
                    }
                    cmd => println!("无效的命令：{}", cmd),
                }
            }
        }
    });

    let mut id: u128 = 0;
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let server = Arc::clone(&server);
        let active_connection = Arc::clone(&active_connection);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = serve(stream, &addr.ip().to_string(), server, id).await {
                error!("[ID{}]连接异常终止：{}", id, e);
            }
            active_connection.fetch_sub(1, Ordering::Relaxed);
        });
        id += 1;
    }
}
