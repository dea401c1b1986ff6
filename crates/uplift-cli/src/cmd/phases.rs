use crate::output::{print_json, print_table};
use uplift_core::phase::Phase;

pub fn run(json: bool) -> anyhow::Result<()> {
    if json {
        #[derive(serde::Serialize)]
        struct PhaseRow {
            name: &'static str,
            destructive: bool,
            resumable: bool,
        }

        let rows: Vec<PhaseRow> = Phase::all()
            .iter()
            .map(|p| PhaseRow {
                name: p.as_str(),
                destructive: p.is_destructive(),
                resumable: p.resumable(),
            })
            .collect();
        return print_json(&rows);
    }

    let mark = |yes: bool| String::from(if yes { "yes" } else { "" });
    let rows: Vec<Vec<String>> = Phase::all()
        .iter()
        .map(|p| {
            vec![
                p.as_str().to_string(),
                mark(p.is_destructive()),
                mark(p.resumable()),
            ]
        })
        .collect();
    print_table(&["PHASE", "DESTRUCTIVE", "RESUMABLE"], &rows);
    Ok(())
}
