//! Site filters, functions and tags.
//!
//! These close over the site services (entries, cache, folders, video
//! metadata), which are injected through [`Services`] when the registry is
//! built rather than captured from ambient state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use landing_cache::Cache;
use landing_storage::Folders;
use landing_template::{
    Block, Context, Filter, Flow, Function, Map, Registry, RenderError, Tag, TagNode, Value,
};
use tracing::warn;

use crate::css::compress_css;
use crate::images::{ScaleMode, TRANSPARENT_GIF, image_size, resized_image};
use crate::request::{REQUEST_VAR, RequestInfo};
use crate::store::Entries;
use crate::youtube::YoutubeService;

/// Shared services available to site extensions.
pub(crate) struct Services {
    pub(crate) folders: Folders,
    pub(crate) entries: Arc<Entries>,
    pub(crate) cache: Arc<dyn Cache>,
    pub(crate) youtube: YoutubeService,
}

impl Services {
    /// A file under `static/`, `None` when missing or outside it.
    fn static_file(&self, path: &str) -> Option<PathBuf> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        Folders::resolve_within(&self.folders.static_dir(), path)
            .ok()
            .filter(|p| p.is_file())
    }
}

type FilterResult = Result<Value, RenderError>;
type ServiceFilter = fn(&Services, &mut Context<'_>, Value, &[Value]) -> FilterResult;
type ServiceFunction = fn(&Services, &mut Context<'_>, &[Value]) -> FilterResult;

struct SiteFilter {
    services: Arc<Services>,
    apply: ServiceFilter,
}

impl Filter for SiteFilter {
    fn apply(&self, ctx: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
        (self.apply)(&self.services, ctx, subject, args)
    }
}

struct SiteFunction {
    services: Arc<Services>,
    call: ServiceFunction,
}

impl Function for SiteFunction {
    fn call(&self, ctx: &mut Context<'_>, args: &[Value]) -> FilterResult {
        (self.call)(&self.services, ctx, args)
    }
}

/// Add the site extensions to `registry`.
pub(crate) fn register(registry: Registry, services: &Arc<Services>) -> Registry {
    let filter = |apply: ServiceFilter| SiteFilter {
        services: Arc::clone(services),
        apply,
    };
    let function = |call: ServiceFunction| SiteFunction {
        services: Arc::clone(services),
        call,
    };

    registry
        .with_filter("img_src", absolute)
        .with_filter("absolute", absolute)
        .with_filter("absolute_url", absolute)
        .with_filter("img_srcset", img_srcset)
        .with_filter("image_size", filter(image_size_filter))
        .with_filter("resized_image", filter(resized_image_filter))
        .with_function("sponsored", sponsored)
        .with_function("error", not_found)
        .with_function("not_found", not_found)
        .with_function("permanent_redirect", permanent_redirect)
        .with_function("temporal_redirect", temporal_redirect)
        .with_function("last_update", function(last_update))
        .with_function("last_post_update", function(last_post_update))
        .with_function("youtube_info", function(youtube_info))
        .with_tag(ImportCss {
            static_dir: services.folders.static_dir(),
        })
        .with_tag(Literal {
            name: "seo",
            end: None,
            text: "<!-- seo -->",
        })
        .with_tag(Literal {
            name: "comment",
            end: Some("endcomment"),
            text: "<!-- comment -->",
        })
}

fn request(ctx: &Context<'_>) -> RequestInfo {
    RequestInfo::from_value(&ctx.var(REQUEST_VAR))
}

fn absolute(ctx: &mut Context<'_>, subject: Value, _: &[Value]) -> FilterResult {
    Ok(Value::from(request(ctx).absolute(&subject.to_string())))
}

/// `"a.png" | img_srcset(480, 960)` gives `"<url> 480w, <url> 960w"`.
fn img_srcset(ctx: &mut Context<'_>, subject: Value, args: &[Value]) -> FilterResult {
    let url = request(ctx).absolute(&subject.to_string());
    let parts: Vec<String> = args
        .iter()
        .map(|width| format!("{url} {}w", width.to_int()))
        .collect();
    Ok(Value::from(parts.join(", ")))
}

fn size_value(width: u32, height: u32) -> Value {
    Value::from(Map::from([
        ("width".to_owned(), Value::from(width)),
        ("height".to_owned(), Value::from(height)),
    ]))
}

/// `{width, height}` of a static image, zero when it cannot be read.
fn image_size_filter(
    services: &Services,
    _: &mut Context<'_>,
    subject: Value,
    _: &[Value],
) -> FilterResult {
    let Some(file) = services.static_file(&subject.to_string()) else {
        return Ok(size_value(0, 0));
    };
    match image_size(services.cache.as_ref(), &file) {
        Ok(size) => Ok(size_value(size.width, size.height)),
        Err(e) => {
            warn!(file = %file.display(), error = %e, "image_size failed");
            Ok(size_value(0, 0))
        }
    }
}

/// `path | resized_image(width, height, mode)`: URL of a resized JPEG copy.
///
/// Missing files pass through unchanged; any failure yields a transparent
/// pixel so a broken image never fails the page.
fn resized_image_filter(
    services: &Services,
    _: &mut Context<'_>,
    subject: Value,
    args: &[Value],
) -> FilterResult {
    let Some(file) = services.static_file(&subject.to_string()) else {
        return Ok(subject);
    };
    let dimension = |i: usize| {
        args.get(i)
            .and_then(Value::to_int_opt)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    let mode = args
        .get(2)
        .map_or(ScaleMode::Cover, |m| ScaleMode::from_name(&m.to_string()));

    match resized_image(
        &file,
        &services.folders.resizes_dir(),
        dimension(0),
        dimension(1),
        mode,
    ) {
        Ok(url) => Ok(Value::from(url)),
        Err(e) => {
            warn!(file = %file.display(), error = %e, "resized_image failed");
            Ok(Value::from(TRANSPARENT_GIF))
        }
    }
}

/// `sponsored(tier?)`: whether the session price reaches the tier of the
/// current post or page, else `tier`, else 1.
fn sponsored(ctx: &mut Context<'_>, args: &[Value]) -> FilterResult {
    let price = ctx.var("session").attr("price").to_int();
    let tier = ctx
        .var("post")
        .attr("sponsor_tier")
        .to_int_opt()
        .or_else(|| ctx.var("page").attr("sponsor_tier").to_int_opt())
        .or_else(|| args.first().and_then(Value::to_int_opt))
        .unwrap_or(1);
    Ok(Value::Bool(price >= tier))
}

fn not_found(_: &mut Context<'_>, _: &[Value]) -> FilterResult {
    Err(RenderError::Halt(Flow::NotFound))
}

fn redirect(args: &[Value], permanent: bool) -> FilterResult {
    let url = args
        .first()
        .and_then(Value::to_text_opt)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| RenderError::eval("redirect needs a URL"))?;
    Err(RenderError::Halt(Flow::Redirect { url, permanent }))
}

fn permanent_redirect(_: &mut Context<'_>, args: &[Value]) -> FilterResult {
    redirect(args, true)
}

fn temporal_redirect(_: &mut Context<'_>, args: &[Value]) -> FilterResult {
    redirect(args, false)
}

fn last_update(services: &Services, _: &mut Context<'_>, _: &[Value]) -> FilterResult {
    let index = services.entries.snapshot()?;
    Ok(Value::Date(index.last_update(None).unwrap_or_else(Utc::now)))
}

fn last_post_update(services: &Services, _: &mut Context<'_>, _: &[Value]) -> FilterResult {
    let index = services.entries.snapshot()?;
    Ok(Value::Date(index.last_update(Some("posts")).unwrap_or_else(Utc::now)))
}

/// `youtube_info("id")` returns one video or null; `youtube_info(list)`
/// returns the known videos, items being ids or maps with an `id`.
fn youtube_info(services: &Services, _: &mut Context<'_>, args: &[Value]) -> FilterResult {
    let subject = args.first().cloned().unwrap_or_default();
    let single = matches!(subject, Value::String(_));
    let ids: Vec<String> = subject
        .to_list()
        .iter()
        .map(|item| match item {
            Value::Map(_) | Value::Object(_) => item.attr("id").to_string(),
            other => other.to_string(),
        })
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty())
        .collect();

    let infos = services.youtube.video_info(&ids)?;
    if single {
        Ok(Value::from(infos.first().map(|info| info.to_value())))
    } else {
        Ok(infos.iter().map(|info| info.to_value()).collect())
    }
}

/// `{% import_css "css/site.css" %}`: the minified stylesheet, read at
/// render time.
struct ImportCss {
    static_dir: PathBuf,
}

#[derive(Debug)]
struct ImportCssNode {
    path: PathBuf,
}

impl Tag for ImportCss {
    fn name(&self) -> &str {
        "import_css"
    }

    fn compile(&self, args: &str, _: Block) -> Result<Arc<dyn TagNode>, String> {
        let name = args.trim().trim_matches(['"', '\'']);
        if name.is_empty() {
            return Err("import_css needs a path".to_owned());
        }
        let path = Folders::resolve_within(&self.static_dir, name)
            .map_err(|_| format!("import_css path escapes static/: {name}"))?;
        Ok(Arc::new(ImportCssNode { path }))
    }
}

impl TagNode for ImportCssNode {
    fn render(&self, _: &mut Context<'_>, out: &mut String) -> Result<(), RenderError> {
        out.push_str(&compress_css(&read(&self.path)?));
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, RenderError> {
    fs::read_to_string(path)
        .map_err(|e| RenderError::eval(format!("cannot read {}: {e}", path.display())))
}

/// Tag that always emits the same text; block bodies are discarded.
struct Literal {
    name: &'static str,
    end: Option<&'static str>,
    text: &'static str,
}

#[derive(Debug)]
struct LiteralNode(&'static str);

impl Tag for Literal {
    fn name(&self) -> &str {
        self.name
    }

    fn end_tag(&self) -> Option<&str> {
        self.end
    }

    fn compile(&self, _: &str, _: Block) -> Result<Arc<dyn TagNode>, String> {
        Ok(Arc::new(LiteralNode(self.text)))
    }
}

impl TagNode for LiteralNode {
    fn render(&self, _: &mut Context<'_>, out: &mut String) -> Result<(), RenderError> {
        out.push_str(self.0);
        Ok(())
    }
}
