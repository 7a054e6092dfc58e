use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::ApplicationSettings;
use crate::deadline::RequestTimeout;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{login, logout, logout_all, me, ping, refresh, register};

pub fn run(
    listener: TcpListener,
    service: AuthService,
    settings: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let codec = service.codec().clone();
    let request_timeout = web::Data::new(RequestTimeout(settings.request_timeout()));
    let service = web::Data::new(service);
    let settings = web::Data::new(settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(service.clone())
            .app_data(settings.clone())
            .app_data(request_timeout.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::Validation(ValidationError::InvalidFormat(format!("request body ({})", err)))
                    .into()
            }))

            .service(
                web::scope("/api/v1/auth")
                    // Public routes
                    .route("/ping", web::get().to(ping))
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))

                    // Protected routes (require a bearer access token)
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(me)),
                    )
                    .service(
                        web::resource("/logout-all")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(logout_all)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
