use std::env;
use std::path::PathBuf;

fn fallback_dotenv_path(
    consolidator_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match (consolidator_home, home_dir) {
        (Some(base), _) => Some(base.join(".env")),
        (None, Some(home)) => Some(home.join(".invoice-consolidator/.env")),
        (None, None) => None,
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("CONSOLIDATOR_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::fallback_dotenv_path;
    use std::path::PathBuf;

    #[test]
    fn fallback_prefers_consolidator_home() {
        let got = fallback_dotenv_path(
            Some(PathBuf::from("/srv/radicacion")),
            Some(PathBuf::from("/home/ana")),
        );

        assert_eq!(got, Some(PathBuf::from("/srv/radicacion/.env")));
    }

    #[test]
    fn fallback_uses_home_when_consolidator_home_unset() {
        let got = fallback_dotenv_path(None, Some(PathBuf::from("/home/ana")));
        let want = Some(PathBuf::from("/home/ana/.invoice-consolidator/.env"));
        assert_eq!(got, want);
    }

    #[test]
    fn fallback_is_none_without_any_home() {
        assert_eq!(fallback_dotenv_path(None, None), None);
    }
}
