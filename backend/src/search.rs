use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::{Extension, Form};
use log::info;
use serde::Serialize;

use crate::auth::Viewer;
use crate::error::AppError;
use crate::filter::{self, requested_page, AdFilter, QueryParams, SearchResults, PAGE_PARAM};
use crate::forms::{self, AdSearchForm, ValidationErrors};
use crate::i18n::Locale;
use crate::matching;
use crate::models::{Ad, EntityKind, Id, NewAdSearch, UserId};
use crate::state::AppState;
use crate::views::{Flash, Outcome, Redirect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Home,
    Filter,
    ReadSearch,
    CreateSearch,
    UpdateSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Home,
    Filter,
    ReadSearch(Id),
    CreateSearch,
    UpdateSearch(Id),
}

impl Transition {
    pub fn state(&self) -> SearchState {
        match self {
            Transition::Home => SearchState::Home,
            Transition::Filter => SearchState::Filter,
            Transition::ReadSearch(_) => SearchState::ReadSearch,
            Transition::CreateSearch => SearchState::CreateSearch,
            Transition::UpdateSearch(_) => SearchState::UpdateSearch,
        }
    }
}

/// | method | search id | query params | state         |
/// |--------|-----------|--------------|---------------|
/// | read   | absent    | absent       | home          |
/// | read   | absent    | present      | filter        |
/// | read   | present   | any          | read_search   |
/// | write  | absent    | any          | create_search |
/// | write  | present   | any          | update_search |
pub fn transition(method: Method, search_id: Option<Id>, has_params: bool) -> Transition {
    match (method, search_id) {
        (Method::Read, None) if has_params => Transition::Filter,
        (Method::Read, None) => Transition::Home,
        (Method::Read, Some(id)) => Transition::ReadSearch(id),
        (Method::Write, None) => Transition::CreateSearch,
        (Method::Write, Some(id)) => Transition::UpdateSearch(id),
    }
}

pub struct SearchRequest {
    pub method: Method,
    pub search_id: Option<Id>,
    pub query: QueryParams,
    /// Submitted save form; default on reads.
    pub form: AdSearchForm,
    pub viewer: Option<UserId>,
    pub locale: Locale,
}

#[derive(Debug, Serialize)]
pub struct SearchPage {
    pub state: SearchState,
    pub search_id: Option<Id>,
    /// Latest ads, on the landing page only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_ads: Option<Vec<Ad>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SearchResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_search_form: Option<AdSearchForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
    pub messages: Vec<Flash>,
}

impl SearchPage {
    fn new(state: SearchState) -> Self {
        Self {
            state,
            search_id: None,
            initial_ads: None,
            results: None,
            ad_search_form: None,
            errors: None,
            messages: Vec::new(),
        }
    }
}

fn count_message(locale: Locale, total: usize) -> Flash {
    if total == 0 {
        Flash::info(locale.no_results())
    } else {
        Flash::info(locale.results(total))
    }
}

pub async fn dispatch(
    state: &AppState,
    request: SearchRequest,
) -> Result<Outcome<SearchPage>, AppError> {
    let next = transition(request.method, request.search_id, !request.query.is_empty());
    info!("Search page state {:?} for {:?}", next, request.viewer);

    match next {
        Transition::Home => home(state).await.map(Outcome::Render),
        Transition::Filter => filter_ads(state, &request.query, request.locale)
            .await
            .map(Outcome::Render),
        Transition::ReadSearch(id) => {
            read_search(state, id, request.viewer, &request.query, request.locale)
                .await
                .map(Outcome::Render)
        }
        Transition::CreateSearch => create_search(state, &request).await,
        Transition::UpdateSearch(id) => update_search(state, id, &request).await,
    }
}

async fn home(state: &AppState) -> Result<SearchPage, AppError> {
    let ads = filter::latest(&*state.stores.ads, state.config.home_ads_count).await?;
    let mut page = SearchPage::new(SearchState::Home);
    page.initial_ads = Some(ads);
    Ok(page)
}

async fn filter_ads(
    state: &AppState,
    query: &QueryParams,
    locale: Locale,
) -> Result<SearchPage, AppError> {
    let params = query.without(PAGE_PARAM);
    let filter = AdFilter::from_params(&params);
    let results = filter::search(
        &*state.stores.ads,
        &filter,
        requested_page(query),
        state.config.paginate_by,
    )
    .await?;

    let mut page = SearchPage::new(SearchState::Filter);
    page.messages.push(count_message(locale, results.total));
    page.ad_search_form = Some(AdSearchForm {
        search: params.encode(),
    });
    page.results = Some(results);
    Ok(page)
}

async fn read_search(
    state: &AppState,
    search_id: Id,
    viewer: Option<UserId>,
    query: &QueryParams,
    locale: Locale,
) -> Result<SearchPage, AppError> {
    // Anonymous and foreign requests look exactly like a missing search.
    let user = viewer.ok_or(AppError::NotFound)?;
    let search = state
        .stores
        .searches
        .get_owned(user, search_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let filter = AdFilter::from_search_string(&search.search);
    let results = filter::search(
        &*state.stores.ads,
        &filter,
        requested_page(query),
        state.config.paginate_by,
    )
    .await?;

    let mut page = SearchPage::new(SearchState::ReadSearch);
    page.search_id = Some(search.id);
    page.messages.push(count_message(locale, results.total));
    page.results = Some(results);
    Ok(page)
}

async fn create_search(
    state: &AppState,
    request: &SearchRequest,
) -> Result<Outcome<SearchPage>, AppError> {
    let user = Viewer(request.viewer).require()?;
    let form = request.form.clone();

    if let Err(errors) = forms::validate(&form) {
        let mut page =
            filter_ads(state, &QueryParams::parse(&form.search), request.locale).await?;
        page.state = SearchState::CreateSearch;
        page.ad_search_form = Some(form);
        page.errors = Some(errors);
        return Ok(Outcome::Rejected(page));
    }

    let search = state
        .stores
        .searches
        .insert(NewAdSearch {
            user,
            search: form.search,
            content_type: EntityKind::Ad,
            public: true,
        })
        .await?;
    info!("User {} saved search {}", user, search.id);
    matching::refresh_for_search(&state.stores, &search).await?;

    Ok(Outcome::Redirect(
        Redirect::to(format!("/search/{}", search.id))
            .with(Flash::info(request.locale.search_saved())),
    ))
}

async fn update_search(
    state: &AppState,
    search_id: Id,
    request: &SearchRequest,
) -> Result<Outcome<SearchPage>, AppError> {
    let user = Viewer(request.viewer).require()?;
    let mut search = state
        .stores
        .searches
        .get_owned(user, search_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let form = request.form.clone();

    let mut messages = Vec::new();
    let errors = match forms::validate(&form) {
        Ok(()) => {
            search.search = form.search.clone();
            state.stores.searches.update(&search).await?;
            info!("User {} updated search {}", user, search.id);
            matching::refresh_for_search(&state.stores, &search).await?;
            messages.push(Flash::info(
                request.locale.search_updated(&state.config.account_url),
            ));
            None
        }
        Err(errors) => Some(errors),
    };

    let mut page = read_search(state, search_id, Some(user), &request.query, request.locale).await?;
    page.state = SearchState::UpdateSearch;
    messages.append(&mut page.messages);
    page.messages = messages;
    page.ad_search_form = Some(form);

    Ok(match errors {
        Some(errors) => {
            page.errors = Some(errors);
            Outcome::Rejected(page)
        }
        None => Outcome::Render(page),
    })
}

fn search_request(
    method: Method,
    search_id: Option<Id>,
    query: Option<String>,
    form: AdSearchForm,
    viewer: Viewer,
    headers: &HeaderMap,
) -> SearchRequest {
    SearchRequest {
        method,
        search_id,
        query: query.as_deref().map(QueryParams::parse).unwrap_or_default(),
        form,
        viewer: viewer.0,
        locale: Locale::from_headers(headers),
    }
}

/// GET /search
pub async fn search_page(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Outcome<SearchPage>, AppError> {
    let request = search_request(
        Method::Read,
        None,
        query,
        AdSearchForm::default(),
        viewer,
        &headers,
    );
    dispatch(&state, request).await
}

/// GET /search/:search_id
pub async fn saved_search_page(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(search_id): Path<Id>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Outcome<SearchPage>, AppError> {
    let request = search_request(
        Method::Read,
        Some(search_id),
        query,
        AdSearchForm::default(),
        viewer,
        &headers,
    );
    dispatch(&state, request).await
}

/// POST /search
pub async fn save_search(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Form(form): Form<AdSearchForm>,
) -> Result<Outcome<SearchPage>, AppError> {
    let request = search_request(Method::Write, None, query, form, viewer, &headers);
    dispatch(&state, request).await
}

/// POST /search/:search_id
pub async fn update_saved_search(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Path(search_id): Path<Id>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Form(form): Form<AdSearchForm>,
) -> Result<Outcome<SearchPage>, AppError> {
    let request = search_request(Method::Write, Some(search_id), query, form, viewer, &headers);
    dispatch(&state, request).await
}
