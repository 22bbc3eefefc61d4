//! Prompt text and prompt builders
//!
//! Few-shot exemplars are plain constants. The builders only concatenate an
//! exemplar block, the linearized table and the statement; every parsing
//! rule lives with the operation that consumes the completion.

use crate::state_machine::{NextStep, Operation};
use crate::table::{linearize_rows, TableSnapshot};

/// Row budget for prompts that show the whole table
pub const FULL_TABLE_ROWS: usize = 100;

/// Row budget for add-column and sort-by previews
pub const PREVIEW_ROWS: usize = 3;

/// Row budget for the group-by preview
pub const GROUP_PREVIEW_ROWS: usize = 5;

/// Add-column exemplars
pub const ADD_COLUMN_DEMO: &str = r#"To tell the statement is true or false, we can first use f_add_column() to add more columns to the table.

The added columns should have these data types:
1. Numerical: the numerical strings that can be used in sort, sum
2. Datetype: the strings that describe a date, such as year, month, day
3. String: other strings

/*
col : week | when | kickoff | opponent | results; final score | results; team record | game site | attendance
row 1 : 1 | saturday, april 13 | 7:00 p.m. | at rhein fire | w 27–21 | 1–0 | rheinstadion | 32,092
row 2 : 2 | saturday, april 20 | 7:00 p.m. | london monarchs | w 37–3 | 2–0 | waldstadion | 34,186
row 3 : 3 | sunday, april 28 | 6:00 p.m. | at barcelona dragons | w 33–29 | 3–0 | estadi olímpic de montjuïc | 17,503
*/
Statement: april _ is the date of the competition with highest attendance.
The existing columns are: week, when, kickoff, opponent, results; final score, results; team record, game site, attendance.
Explanation: To tell this statement is true or false, we need to know the attendence number of each competition. We extract the value from column "attendance" and create a different column "attendance number" for each row. The datatype is numerical.
Therefore, the answer is: f_add_column(attendance number). The value: 32092 | 34186 | 17503

/*
col : rank | lane | player | time
row 1 :  | 5 | olga tereshkova (kaz) | 51.86
row 2 :  | 6 | manjeet kaur (ind) | 52.17
row 3 :  | 3 | asami tanno (jpn) | 53.04
*/
Statement: there are one athlete from japan.
The existing columns are: rank, lane, player, time.
Explanation: To tell this statement is true or false, we need to know the country of each athelte. We extract the value from column "player" and create a different column "country of athletes" for each row. The datatype is string.
Therefore, the answer is: f_add_column(country of athletes). The value: kaz | ind | jpn

/*
col : match | date | ground | opponent | score1 | pos. | pts. | gd
row 1 : 1 | 15 august | a | bayer uerdingen | 3 – 0 | 1 | 2 | 3
row 2 : 2 | 22 july | h | 1. fc kaiserslautern | 1 – 0 | 1 | 4 | 4
row 3 : 4 | 29 september | h | dynamo dresden | 3 – 1 | 1 | 6 | 6
*/
Statement: they play _ times in august.
The existing columns are: match, date, ground, opponent, score1, pos., pts., gd.
Explanation: To tell this statement is true or false, we need to know the month of each match. We extract the value from column "date" and create a different column "month" for each row. The datatype is datetype.
Therefore, the answer is: f_add_column(month). The value: august | july | september"#;

/// Row-selection exemplars
pub const SELECT_ROW_DEMO: &str = r"Using f_row() api to select relevant rows in the given table that support or oppose the statement.
Please use f_row([*]) to select all rows in the table.

/*
table caption : 1972 vfl season.
col : home team | home team score | away team | away team score | venue | crowd | date
row 1 : st kilda | 13.12 (90) | melbourne | 13.11 (89) | moorabbin oval | 18836 | 19 august 1972
row 2 : south melbourne | 9.12 (66) | footscray | 11.13 (79) | lake oval | 9154 | 19 august 1972
row 3 : richmond | 20.17 (137) | fitzroy | 13.22 (100) | mcg | 27651 | 19 august 1972
row 4 : geelong | 17.10 (112) | collingwood | 17.9 (111) | kardinia park | 23108 | 19 august 1972
*/
statement : the away team with the highest score is fitzroy.
explain : the statement want to check the highest away team score. we need to compare score of away team fitzroy with all others, so we need all rows. use * to represent all rows in the table.
The answer is : f_row([*])

/*
table caption : jeep grand cherokee.
col : years | displacement | engine | power | torque
row 1 : 1999 - 2004 | 4.0l (242cid) | power tech i6 | - | 3000 rpm
row 2 : 1999 - 2004 | 4.7l (287cid) | powertech v8 | - | 3200 rpm
row 3 : 2002 - 2004 | 4.7l (287cid) | high output powertech v8 | - | -
row 4 : 1999 - 2001 | 3.1l diesel | 531 ohv diesel i5 | - | -
row 5 : 2002 - 2004 | 2.7l diesel | om647 diesel i5 | - | -
*/
statement : the jeep grand cherokee with the om647 diesel i5 had the third lowest numbered displacement.
explain : the statement want to check the om647 diesel i5 had third lowest numbered displacement. so we need first three low numbered displacement and all rows that power is om647 diesel i5.
The answer is : f_row([row 5, row 4, row 1])";

/// Column-selection exemplars
pub const SELECT_COLUMN_DEMO: &str = r#"Use f_col() api to filter out useless columns in the table according to informations in the statement and the table.

/*
{
  "table_caption": "gambrinus liga",
  "columns": ["season", "champions", "runner - up", "third place", "top goalscorer", "club"],
  "table_column_priority": [
    ["season", "1993 - 94", "1994 - 95", "1995 - 96"],
    ["champions", "sparta prague (1)", "sparta prague (2)", "slavia prague (1)"],
    ["runner - up", "slavia prague", "slavia prague", "sigma olomouc"],
    ["third place", "baník ostrava", "fc brno", "baumit jablonec"],
    ["top goalscorer", "horst siegl (20)", "radek drulák (15)", "radek drulák (22)"],
    ["club", "sparta prague", "drnovice", "drnovice"]
  ]
}
*/
statement : the top goal scorer for the season 2010 - 2011 was david lafata.
similar words link to columns :
season 2010 - 2011 -> season
the top goal scorer -> top goalscorer
column value link to columns :
2010 - 2011 -> season
semantic sentence link to columns :
the top goal scorer for ... was david lafata -> top goalscorer
The answer is : f_col([season, top goalscorer])"#;

/// Group-by exemplars
pub const GROUP_COLUMN_DEMO: &str = r#"To tell the statement is true or false, we can first use f_group() to group the values in a column.

/*
col : rank | lane | athlete | time | country
row 1 : 1 | 6 | manjeet kaur (ind) | 52.17 | ind
row 2 : 2 | 5 | olga tereshkova (kaz) | 51.86 | kaz
row 3 : 3 | 4 | pinki pramanik (ind) | 53.06 | ind
row 4 : 4 | 1 | tang xiaoyin (chn) | 53.66 | chn
row 5 : 5 | 8 | marina maslyonko (kaz) | 53.99 | kaz
*/
Statement: there are one athlete from japan.
The existing columns are: rank, lane, athlete, time, country.
Explanation: the statement says the number of athletes from japan is one. Each row is about an athlete. We can group column "country" to group the athletes from the same country.
Therefore, the answer is: f_group(country)."#;

/// Sort-by exemplars
pub const SORT_COLUMN_DEMO: &str = r#"To tell the statement is true or false, we can first use f_sort() to sort the values in a column to get the order of the items. The order can be "large to small" or "small to large".

The column to sort should have these data types:
1. Numerical: the numerical strings that can be used in sort
2. DateType: the strings that describe a date, such as year, month, day
3. String: other strings

/*
col : position | club | played | points | wins | draws | losses
row 1 : 1 | malaga cf | 42 | 79 | 22 | 13 | 7
row 2 : 10 | cp merida | 42 | 59 | 15 | 14 | 13
row 3 : 3 | cd numancia | 42 | 73 | 21 | 10 | 11
*/
Statement: cd numancia placed in the last position
The existing columns are: position, club, played, points, wins, draws, losses.
Explanation: the statement wants to check cd numanica is in the last position. Each row is about a club. We need to know the order of position from last to front. There is a column for position and the column name is position. The datatype is Numerical.
Therefore, the answer is: f_sort(position), the order is "large to small".

/*
col : year | team | games | combined tackles | tackles | assisted tackles
row 1 : 2004 | hou | 16 | 63 | 51 | 12
row 2 : 2005 | hou | 12 | 35 | 24 | 11
row 3 : 2006 | hou | 15 | 26 | 19 | 7
*/
Statement: in 2006 babin had the least amount of tackles
The existing columns are: year, team, games, combined tackles, tackles, assisted tackles.
Explanation: the statement wants to check babin had the least amount of tackles in 2006. Each row is about a year. We need to know the order of tackles from the least to the most. There is a column for tackles and the column name is tackles. The datatype is Numerical.
Therefore, the answer is: f_sort(tackles), the order is "small to large"."#;

/// Planner exemplar for add-column
pub const PLAN_ADD_COLUMN_DEMO: &str = r#"If the table does not have the needed column to tell whether the statement is True or False, we use f_add_column() to add a new column for it. For example,
/*
col : rank | lane | player | time
row 1 :  | 5 | olga tereshkova (kaz) | 51.86
row 2 :  | 6 | manjeet kaur (ind) | 52.17
row 3 :  | 3 | asami tanno (jpn) | 53.04
*/
Statement: there are one athlete from japan.
Function: f_add_column(country of athlete)
Explanation: The statement is about the number of athletes from japan. We need to known the country of each athlete. There is no column of the country of athletes. We add a column "country of athlete"."#;

/// Planner exemplar for row selection
pub const PLAN_SELECT_ROW_DEMO: &str = r"If the table only needs a few rows to tell whether the statement is True or False, we use f_select_row() to select these rows for it. For example,
/*
table caption : jeep grand cherokee.
col : years | displacement | engine | power | torque
row 1 : 1999 - 2004 | 4.0l (242cid) | power tech i6 | - | 3000 rpm
row 2 : 1999 - 2004 | 4.7l (287cid) | powertech v8 | - | 3200 rpm
row 3 : 2002 - 2004 | 4.7l (287cid) | high output powertech v8 | - | -
row 4 : 1999 - 2001 | 3.1l diesel | 531 ohv diesel i5 | - | -
row 5 : 2002 - 2004 | 2.7l diesel | om647 diesel i5 | - | -
*/
Statement: the jeep grand cherokee with the om647 diesel i5 had the third lowest numbered displacement.
Function: f_select_row(row 1, row 4, row 5)
Explanation: The statement wants to check the om647 diesel i5 had third lowest numbered displacement. We need to know the first three low numbered displacement and all rows that power is om647 diesel i5. We select the row 1, row 4, row 5.";

/// Planner exemplar for column selection
pub const PLAN_SELECT_COLUMN_DEMO: &str = r#"If the table only needs a few columns to tell whether the statement is True or False, we use f_select_column() to select these columns for it. For example,
/*
col : code | county | former province | area (km2) | population | capital
row 1 : 1 | mombasa | coast | 212.5 | 939,370 | mombasa (city)
row 2 : 2 | kwale | coast | 8,270.3 | 649,931 | kwale
row 3 : 3 | kilifi | coast | 12,245.9 | 1,109,735 | kilifi
*/
Statement: momasa is a county with population higher than 500000.
Function: f_select_column(county, population)
Explanation: The statement wants to check momasa county with population higher than 500000. We need to know the county and its population. We select the column "county" and column "population"."#;

/// Planner exemplar for group-by
pub const PLAN_GROUP_COLUMN_DEMO: &str = r#"If the statement is about items with the same value and the number of these items, we use f_group_column() to group the items. For example,
/*
col : district | name | party | residence | first served
row 1 : district 1 | nelson albano | dem | vineland | 2006
row 2 : district 1 | robert andrzejczak | dem | middle twp. | 2013†
row 3 : district 2 | john f. amodeo | rep | margate | 2008
*/
Statement: there are 5 districts are democratic
Function: f_group_column(party)
Explanation: The statement wants to check 5 districts are democratic. We need to know the number of dem in the table. We group the rows according to column "party"."#;

/// Planner exemplar for sort-by
pub const PLAN_SORT_COLUMN_DEMO: &str = r#"If the statement is about the order of items in a column, we use f_sort_column() to sort the items. For example,
/*
col : position | club | played | points
row 1 : 1 | malaga cf | 42 | 79
row 2 : 10 | cp merida | 42 | 59
row 3 : 3 | cd numancia | 42 | 73
*/
Statement: cd numancia placed in the last position.
Function: f_sort_column(position)
Explanation: The statement wants to check about cd numancia in the last position. We need to know the order of position from last to front. We sort the rows according to column "position"."#;

/// Whole-chain planner exemplars
pub const PLAN_FULL_DEMO: &str = r"Here are examples of using the operations to tell whether the statement is True or False.

/*
col : date | division | league | regular season | playoffs | open cup | avg. attendance
row 1 : 2001/01/02 | 2 | usl a-league | 4th, western | quarterfinals | did not qualify | 7,169
row 2 : 2002/08/06 | 2 | usl a-league | 2nd, pacific | 1st round | did not qualify | 6,260
row 3 : 2005/03/24 | 2 | usl first division | 5th | quarterfinals | 4th round | 6,028
*/
Statement: 2005 is the last year where this team was a part of the usl a-league?
Function Chain: f_add_column(year) -> f_select_row(row 1, row 2) -> f_select_column(year, league) -> f_sort_column(year) -> <END>

/*
col : rank | lane | athlete | time
row 1 : 1 | 6 | manjeet kaur (ind) | 52.17
row 2 : 2 | 5 | olga tereshkova (kaz) | 51.86
row 3 : 3 | 4 | pinki pramanik (ind) | 53.06
*/
Statement: There are 10 athletes from India.
Function Chain: f_add_column(country of athletes) -> f_select_row(row 1, row 3) -> f_select_column(athlete, country of athletes) -> f_group_column(country of athletes) -> <END>

/*
col : iso/iec standard | status | wg
row 1 : iso/iec tr 19759 | published (2005) | 20
row 2 : iso/iec 15288 | published (2008) | 7
row 3 : iso/iec 12207 | published (2011) | 7
*/
Statement: 2 standards are published in 2011
Function Chain: f_add_column(year) -> f_select_row(row 3) -> f_select_column(year) -> f_group_column(year) -> <END>

Here are examples of using the operations to tell whether the statement is True or False.";

/// Final-query instruction
pub const FINAL_QUERY_INSTRUCTION: &str = "Here are the statement about the table and the task is to tell whether the statement is True or False.\nIf the statement is true, answer YES, and otherwise answer NO.\n";

/// Final-query exemplars
pub const FINAL_QUERY_DEMO: &str = r"/*
table caption : 2008 sidecarcross world championship.
col : position | driver / passenger | equipment | bike no | points
row 1 : 1 | daniël willemsen / reto grütter | ktm - ayr | 1 | 531
row 2 : 2 | kristers sergis / kaspars stupelis | ktm - ayr | 3 | 434
row 3 : 3 | jan hendrickx / tim smeuninx | zabel - vmc | 2 | 421
row 4 : 4 | joris hendrickx / kaspars liepins | zabel - vmc | 8 | 394
*/
Statement: bike number 3 is the only one to use equipment ktm - ayr.
The anwser is: NO

/*
table caption : 2003 pga championship.
col : place | player | country | score | to par
row 1 : 1 | shaun micheel | united states | 69 + 68 = 137 | - 3
row 2 : t2 | billy andrade | united states | 67 + 72 = 139 | - 1
row 3 : t2 | mike weir | canada | 68 + 71 = 139 | - 1
row 4 : 4 | rod pampling | australia | 66 + 74 = 140 | e
row 5 : t5 | chad campbell | united states | 69 + 72 = 141 | + 1
*/
Statement: phil mickelson was one of five players with + 1 to par , all of which had placed t5.
The anwser is: YES";

/// Marker that starts the add-column explanation reused by follow-ups
pub const ADD_COLUMN_EXPLANATION_MARKER: &str = "We extract the value from";

/// Marker that precedes the add-column values
pub const ADD_COLUMN_VALUE_MARKER: &str = "The value:";

/// Stop sequence for planner calls
pub const PLAN_STOP: &str = "\n\n";

/// Planner exemplar of one operation
#[must_use]
pub fn plan_demo(operation: Operation) -> &'static str {
    match operation {
        Operation::AddColumn => PLAN_ADD_COLUMN_DEMO,
        Operation::SelectRow => PLAN_SELECT_ROW_DEMO,
        Operation::SelectColumn => PLAN_SELECT_COLUMN_DEMO,
        Operation::GroupColumn => PLAN_GROUP_COLUMN_DEMO,
        Operation::SortColumn => PLAN_SORT_COLUMN_DEMO,
    }
}

/// `/*\n<table>\n*/\n` block
#[must_use]
pub fn table_block(table: &str) -> String {
    format!("/*\n{table}\n*/\n")
}

/// Shared tail of the add-column, group-by and sort-by prompts
fn explained_operation_prompt(
    demo: &str,
    snapshot: &TableSnapshot,
    caption: Option<&str>,
    rows: usize,
    statement: &str,
) -> String {
    let mut prompt = String::with_capacity(demo.len() + 512);
    prompt.push_str(demo.trim_end());
    prompt.push_str("\n\n");
    prompt.push_str(&table_block(&snapshot.linearize(caption, rows)));
    prompt.push_str("Statement: ");
    prompt.push_str(statement);
    prompt.push('\n');
    prompt.push_str("The existing columns are: ");
    prompt.push_str(&snapshot.headers().join(", "));
    prompt.push_str(".\nExplanation:");
    prompt
}

/// Add-column proposal prompt
#[must_use]
pub fn add_column_prompt(snapshot: &TableSnapshot, caption: Option<&str>, statement: &str) -> String {
    explained_operation_prompt(ADD_COLUMN_DEMO, snapshot, caption, PREVIEW_ROWS, statement)
}

/// Header of one add-column follow-up block
#[must_use]
pub fn add_column_follow_up_header(
    headers: &[String],
    rows: &[Vec<String>],
    caption: Option<&str>,
) -> String {
    let mut header = table_block(&linearize_rows(headers, rows, caption, PREVIEW_ROWS));
    header.push_str("Explanation: ");
    header
}

/// Group-by proposal prompt
#[must_use]
pub fn group_column_prompt(snapshot: &TableSnapshot, caption: Option<&str>, statement: &str) -> String {
    explained_operation_prompt(GROUP_COLUMN_DEMO, snapshot, caption, GROUP_PREVIEW_ROWS, statement)
}

/// Sort-by proposal prompt (no caption)
#[must_use]
pub fn sort_column_prompt(snapshot: &TableSnapshot, statement: &str) -> String {
    explained_operation_prompt(SORT_COLUMN_DEMO, snapshot, None, PREVIEW_ROWS, statement)
}

/// Row-selection prompt
#[must_use]
pub fn select_row_prompt(snapshot: &TableSnapshot, caption: Option<&str>, statement: &str) -> String {
    let mut prompt = String::from(SELECT_ROW_DEMO.trim_end());
    prompt.push_str("\n\n");
    prompt.push_str(&table_block(&snapshot.linearize(caption, FULL_TABLE_ROWS)));
    prompt.push_str("statement : ");
    prompt.push_str(statement);
    prompt.push_str("\nexplain :");
    prompt
}

/// Column-selection prompt over the transposed table
///
/// Each column becomes one JSON line `[header, v1, v2, ...]`.
#[must_use]
pub fn select_column_prompt(snapshot: &TableSnapshot, caption: Option<&str>, statement: &str) -> String {
    let inline = |values: &[&str]| serde_json::to_string(values).unwrap_or_default();

    let headers: Vec<&str> = snapshot.headers().iter().map(String::as_str).collect();
    let mut body = String::from("{\n");
    if let Some(caption) = caption {
        body.push_str("  \"table_caption\": ");
        body.push_str(&serde_json::to_string(caption).unwrap_or_default());
        body.push_str(",\n");
    }
    body.push_str("  \"columns\": ");
    body.push_str(&inline(&headers));
    body.push_str(",\n  \"table_column_priority\": [\n");
    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let mut column = vec![*header];
            column.extend(
                snapshot
                    .rows()
                    .iter()
                    .take(FULL_TABLE_ROWS)
                    .map(|row| row[idx].as_str()),
            );
            format!("    {}", inline(&column))
        })
        .collect();
    body.push_str(&columns.join(",\n"));
    body.push_str("\n  ]\n}");

    let mut prompt = String::from(SELECT_COLUMN_DEMO.trim_end());
    prompt.push_str("\n\n/*\ntable = ");
    prompt.push_str(&body);
    prompt.push_str("\n*/\nstatement : ");
    prompt.push_str(statement);
    prompt.push_str(".\nsimilar words link to columns :\n");
    prompt
}

/// Planner prompt
///
/// `chain` is the kept chain already rendered; `legal` must be non-empty.
#[must_use]
pub fn plan_prompt(snapshot: &TableSnapshot, statement: &str, chain: &[String], legal: &[NextStep]) -> String {
    let mut prompt = String::new();
    for step in legal {
        if let NextStep::Apply(operation) = step {
            prompt.push_str(plan_demo(*operation));
            prompt.push_str("\n\n");
        }
    }
    prompt.push_str(PLAN_FULL_DEMO);
    prompt.push_str("\n\n");
    prompt.push_str(&table_block(&snapshot.linearize(None, FULL_TABLE_ROWS)));
    prompt.push_str("Statement: ");
    prompt.push_str(statement);
    prompt.push('\n');

    let options: Vec<String> = legal.iter().map(ToString::to_string).collect();
    if options.len() > 1 {
        prompt.push_str(&format!("The next operation must be one of {}.\n", options.join(" or ")));
    } else {
        prompt.push_str(&format!("The next operation must be {}.\n", options.join(" or ")));
    }

    prompt.push_str("Function Chain: ");
    if !chain.is_empty() {
        prompt.push_str(&chain.join(" -> "));
        prompt.push_str(" ->");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TableSnapshot {
        TableSnapshot::new(
            vec!["year".into(), "score".into()],
            vec![
                vec!["1999".into(), "10".into()],
                vec!["2000".into(), "20".into()],
                vec!["2001".into(), "5".into()],
                vec!["2002".into(), "7".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn add_column_prompt_previews_three_rows() {
        let prompt = add_column_prompt(&snapshot(), Some("scores"), "_ has the lowest score");
        assert!(prompt.starts_with(ADD_COLUMN_DEMO.trim_end()));
        assert!(prompt.contains("row 3 : 2001 | 5"));
        assert!(!prompt.contains("row 4 : 2002"));
        assert!(prompt.ends_with("The existing columns are: year, score.\nExplanation:"));
    }

    #[test]
    fn plan_prompt_lists_legal_steps_and_chain() {
        let legal = [NextStep::Apply(Operation::SortColumn), NextStep::End];
        let chain = vec!["f_select_column(year, score)".to_string()];
        let prompt = plan_prompt(&snapshot(), "s", &chain, &legal);
        assert!(prompt.starts_with(PLAN_SORT_COLUMN_DEMO));
        assert!(!prompt.contains(PLAN_ADD_COLUMN_DEMO));
        assert!(prompt.contains("The next operation must be one of f_sort_column() or <END>.\n"));
        assert!(prompt.ends_with("Function Chain: f_select_column(year, score) ->"));
    }

    #[test]
    fn select_column_prompt_transposes() {
        let prompt = select_column_prompt(&snapshot(), None, "s");
        assert!(prompt.contains(r#"  "columns": ["year","score"],"#));
        assert!(prompt.contains(r#"    ["score","10","20","5","7"]"#));
        assert!(prompt.ends_with("statement : s.\nsimilar words link to columns :\n"));
    }

    #[test]
    fn follow_up_header_numbers_from_one() {
        let headers = vec!["a".to_string()];
        let rows = vec![vec!["x".to_string()]];
        assert_eq!(
            add_column_follow_up_header(&headers, &rows, None),
            "/*\ncol : a\nrow 1 : x\n*/\nExplanation: "
        );
    }
}
