use actix_files::NamedFile;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use crate::catalog::Catalog;
use crate::error::AppError;
use crate::metadata::SearchHit;
use crate::search;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 200;

/// Shared read handle on the catalog. The HTTP side never writes.
pub struct CatalogData {
    catalog: Mutex<Catalog>,
}

impl CatalogData {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Mutex::new(catalog),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Catalog>, AppError> {
        self.catalog
            .lock()
            .map_err(|_| AppError::Generic("catalog lock poisoned".into()))
    }
}

#[derive(Deserialize, Debug)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    page: usize,
    page_size: Option<usize>,
}

#[derive(Serialize, Debug)]
struct SearchPage {
    results: Vec<SearchHit>,
    page: usize,
    next: Option<usize>,
    prev: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct TagParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct QueryParam {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize, Debug)]
struct PathParam {
    path: String,
}

async fn search_images(
    data: web::Data<CatalogData>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    log::debug!("Received search request: {:?}", params);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    // A page past any representable offset is simply empty.
    let offset = params.page.checked_mul(page_size);
    let results = match offset {
        Some(offset) if !params.q.trim().is_empty() => data.lock()?.search(
            &search::phrase_query(&params.q),
            Some(page_size),
            Some(offset),
        )?,
        _ => Vec::new(),
    };

    let page = SearchPage {
        next: params
            .page
            .checked_add(1)
            .filter(|_| results.len() == page_size),
        prev: params.page.checked_sub(1),
        page: params.page,
        results,
    };
    Ok(HttpResponse::Ok().json(page))
}

async fn search_tags(
    data: web::Data<CatalogData>,
    params: web::Query<TagParams>,
) -> Result<HttpResponse, AppError> {
    let tags = data.lock()?.search_tags(&params.q, params.limit)?;
    Ok(HttpResponse::Ok().json(tags))
}

async fn search_metadata(
    data: web::Data<CatalogData>,
    params: web::Query<QueryParam>,
) -> Result<HttpResponse, AppError> {
    let rows = data.lock()?.search_metadata(&params.q)?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn get_image(
    data: web::Data<CatalogData>,
    params: web::Query<PathParam>,
) -> Result<HttpResponse, AppError> {
    let record = data
        .lock()?
        .get(&params.path)?
        .ok_or_else(|| AppError::NotFound(params.path.clone()))?;
    Ok(HttpResponse::Ok().json(record))
}

/// Serve the photo file itself, but only for paths the catalog knows about.
async fn get_photo(
    data: web::Data<CatalogData>,
    params: web::Query<PathParam>,
) -> Result<NamedFile, AppError> {
    if !data.lock()?.exists(&params.path)? {
        return Err(AppError::NotFound(params.path.clone()));
    }
    log::trace!("Serving photo from: {:?}", params.path);
    NamedFile::open_async(&params.path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound(params.path.clone())
        } else {
            AppError::Io(e)
        }
    })
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/search").route(web::get().to(search_images)))
        .service(web::resource("/api/tags").route(web::get().to(search_tags)))
        .service(web::resource("/api/metadata").route(web::get().to(search_metadata)))
        .service(web::resource("/api/images").route(web::get().to(get_image)))
        .service(web::resource("/api/photo").route(web::get().to(get_photo)));
}

pub async fn start_web_server(catalog: Catalog, port: u16) -> std::io::Result<()> {
    let catalog_data = web::Data::new(CatalogData::new(catalog));

    log::info!("Starting web server on port: {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(catalog_data.clone())
            .configure(routes)
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{GeoMetadata, ImageField, ImageRecord, TagCount};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::Value;

    fn catalog(photo: &str) -> Catalog {
        let mut catalog = Catalog::open_in_memory().unwrap();
        for (i, path) in [photo, "/photos/b.jpg", "/photos/c.jpg"].iter().enumerate() {
            catalog
                .upsert_field(path, ImageField::AltText, &format!("harbour boat number {i}"))
                .unwrap();
            catalog.upsert_metadata(path, Some(-6.1), Some(39.2), None).unwrap();
        }
        catalog.increment_tag("boat").unwrap();
        catalog
    }

    macro_rules! app {
        ($photo:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(CatalogData::new(catalog($photo))))
                    .configure(routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn search_pages_forward_while_full() {
        let app = app!("/photos/a.jpg");

        let req = test::TestRequest::get()
            .uri("/api/search?q=harbour%20boat&page=0&page_size=2")
            .to_request();
        let first: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(first["results"].as_array().unwrap().len(), 2);
        assert_eq!(first["next"], 1);
        assert!(first["prev"].is_null());
        assert!(first["results"][0]["snippet"].as_str().unwrap().contains("snippet"));

        let req = test::TestRequest::get()
            .uri("/api/search?q=harbour%20boat&page=1&page_size=2")
            .to_request();
        let second: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(second["results"].as_array().unwrap().len(), 1);
        assert!(second["next"].is_null());
        assert_eq!(second["prev"], 0);
    }

    #[actix_web::test]
    async fn page_beyond_any_offset_is_empty() {
        let app = app!("/photos/a.jpg");
        let req = test::TestRequest::get()
            .uri(&format!("/api/search?q=boat&page={}&page_size=2", usize::MAX))
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;

        assert!(page["results"].as_array().unwrap().is_empty());
        assert!(page["next"].is_null());
        assert_eq!(page["prev"], usize::MAX - 1);
    }

    #[actix_web::test]
    async fn quotes_in_search_text_are_harmless() {
        let app = app!("/photos/a.jpg");
        let req = test::TestRequest::get()
            .uri("/api/search?q=%22boat")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn tags_and_metadata() {
        let app = app!("/photos/a.jpg");

        let req = test::TestRequest::get().uri("/api/tags?q=bo").to_request();
        let tags: Vec<TagCount> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(tags, vec![TagCount { tag: "boat".into(), count: 1 }]);

        let req = test::TestRequest::get().uri("/api/metadata?q=b.jpg").to_request();
        let rows: Vec<GeoMetadata> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "/photos/b.jpg");
    }

    #[actix_web::test]
    async fn image_detail_or_404() {
        let app = app!("/photos/a.jpg");

        let req = test::TestRequest::get()
            .uri("/api/images?path=/photos/b.jpg")
            .to_request();
        let record: ImageRecord = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record.alt_text.as_deref(), Some("harbour boat number 1"));

        let req = test::TestRequest::get()
            .uri("/api/images?path=/photos/nope.jpg")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn photo_only_for_catalogued_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let photo = tmp.path().join("a.jpg");
        std::fs::write(&photo, b"jpeg bytes").unwrap();
        let stray = tmp.path().join("stray.jpg");
        std::fs::write(&stray, b"jpeg bytes").unwrap();
        let app = app!(photo.to_str().unwrap());

        let req = test::TestRequest::get()
            .uri(&format!("/api/photo?path={}", photo.display()))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(&body[..], b"jpeg bytes");

        let req = test::TestRequest::get()
            .uri(&format!("/api/photo?path={}", stray.display()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
