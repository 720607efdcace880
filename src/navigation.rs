use crate::models::ModelSelector;

/// Client-side page addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Upload,
    Results(String),
    History,
}

/// Where a requested path ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: Route,
    pub redirected: bool,
}

impl Route {
    pub const UPLOAD_PATH: &'static str = "/upload";
    pub const HISTORY_PATH: &'static str = "/history";

    /// Maps a request path onto a page. `/` and anything unknown land on the
    /// upload page as a redirect.
    pub fn resolve(path: &str) -> Navigation {
        let trimmed = path.trim_end_matches('/');
        let route = match trimmed {
            Self::UPLOAD_PATH => Some(Route::Upload),
            Self::HISTORY_PATH => Some(Route::History),
            _ => trimmed
                .strip_prefix("/results/")
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .map(|identifier| {
                    Route::Results(
                        urlencoding::decode(identifier)
                            .map(|decoded| decoded.into_owned())
                            .unwrap_or_else(|_| identifier.to_string()),
                    )
                }),
        };

        match route {
            Some(route) => Navigation {
                route,
                redirected: false,
            },
            None => Navigation {
                route: Route::Upload,
                redirected: true,
            },
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Upload => Self::UPLOAD_PATH.to_string(),
            Route::History => Self::HISTORY_PATH.to_string(),
            Route::Results(identifier) => format!("/results/{}", urlencoding::encode(identifier)),
        }
    }

    pub fn results_with_model(identifier: &str, model: ModelSelector) -> String {
        format!(
            "{}?model_type={}",
            Route::Results(identifier.to_string()).path(),
            model.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_routes_resolve() {
        assert_eq!(Route::resolve("/upload").route, Route::Upload);
        assert_eq!(Route::resolve("/history/").route, Route::History);
        assert_eq!(
            Route::resolve("/results/abc.jpg"),
            Navigation {
                route: Route::Results("abc.jpg".into()),
                redirected: false
            }
        );
        assert_eq!(
            Route::resolve("/results/my%20photo.jpg").route,
            Route::Results("my photo.jpg".into())
        );
    }

    #[test]
    fn test_unknown_paths_redirect_to_upload() {
        for path in ["/", "", "/settings", "/results", "/results/", "/results/a/b"] {
            assert_eq!(
                Route::resolve(path),
                Navigation {
                    route: Route::Upload,
                    redirected: true
                },
                "path {:?}",
                path
            );
        }
    }

    #[test]
    fn test_paths_round_trip() {
        for route in [
            Route::Upload,
            Route::History,
            Route::Results("my photo?.jpg".into()),
        ] {
            assert_eq!(Route::resolve(&route.path()).route, route);
        }
        assert_eq!(
            Route::results_with_model("abc.jpg", ModelSelector::MobilenetV2),
            "/results/abc.jpg?model_type=mobilenet_v2"
        );
    }
}
