use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .env_remove("STUDENTD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn uids(result: &serde_json::Value) -> Vec<String> {
    result["rows"]
        .as_array()
        .expect("rows array")
        .iter()
        .map(|r| r["uid"].as_str().unwrap_or("").to_string())
        .collect()
}

struct Seeded {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
}

fn seeded(prefix: &str) -> Seeded {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let rows = [
        ("10", "Ava Stone", "9", "A", "Math, Art", "95, 95"),
        ("2", "Ben Ode", "10", "B", "Math", "80"),
        ("abc", "Cy Park", "9", "", "Math", "60"),
        ("3", "Dee, Jr.", "9", "C", "", ""),
    ];
    for (uid, name, class, section, subjects, marks) in rows {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("seed-{uid}"),
            "students.create",
            json!({
                "uid": uid,
                "name": name,
                "studentClass": class,
                "section": section,
                "subjects": subjects,
                "marks": marks
            }),
        );
    }
    Seeded {
        child,
        stdin,
        reader,
        workspace,
    }
}

fn finish(mut s: Seeded) {
    drop(s.stdin);
    let _ = s.child.wait();
    let _ = std::fs::remove_dir_all(s.workspace);
}

#[test]
fn roster_query_sorts_filters_and_searches() {
    let mut s = seeded("studentd-roster");

    let all = request_ok(&mut s.stdin, &mut s.reader, "q1", "roster.query", json!({}));
    assert_eq!(uids(&all), vec!["2", "3", "10", "abc"]);
    assert_eq!(all["total"], json!(4));
    assert_eq!(all["classOptions"], json!(["All", "10", "9"]));
    let dee = &all["rows"][1];
    assert_eq!(dee["averageDisplay"], json!("-"));
    assert_eq!(dee["grade"], json!("N/A"));

    let by_avg = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q2",
        "roster.query",
        json!({ "sort": { "key": "Average", "ascending": true } }),
    );
    assert_eq!(uids(&by_avg), vec!["abc", "2", "10", "3"]);

    let by_name_desc = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q3",
        "roster.query",
        json!({ "sort": { "key": "Name", "ascending": false } }),
    );
    assert_eq!(uids(&by_name_desc), vec!["3", "abc", "2", "10"]);

    let class9_a_or_better = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q4",
        "roster.query",
        json!({ "filters": { "class": "9", "grade": "A" } }),
    );
    assert_eq!(uids(&class9_a_or_better), vec!["10"]);

    let bounded = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q5",
        "roster.query",
        json!({ "filters": { "class": "All", "minAverage": "70", "maxAverage": 90 } }),
    );
    assert_eq!(uids(&bounded), vec!["2"]);

    let searched = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q6",
        "roster.query",
        json!({ "search": "ART", "filters": { "grade": "All" } }),
    );
    assert_eq!(uids(&searched), vec!["10"]);

    let by_mark = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "q7",
        "roster.query",
        json!({ "search": "80.0" }),
    );
    assert_eq!(uids(&by_mark), vec!["2"]);

    let bad_bound = request(
        &mut s.stdin,
        &mut s.reader,
        "q8",
        "roster.query",
        json!({ "filters": { "minAverage": "lots" } }),
    );
    assert_eq!(error_code(&bad_bound), "bad_params");
    assert_eq!(
        bad_bound["error"]["message"],
        json!("Min/Max averages must be numeric.")
    );

    let bad_key = request(
        &mut s.stdin,
        &mut s.reader,
        "q9",
        "roster.query",
        json!({ "sort": { "key": "Section" } }),
    );
    assert_eq!(error_code(&bad_key), "bad_params");

    finish(s);
}

#[test]
fn csv_export_writes_header_and_rows() {
    let mut s = seeded("studentd-csv");
    let out = s.workspace.join("out").join("students.csv");

    let result = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "e1",
        "export.csv",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(result["rowsExported"], json!(4));

    let text = std::fs::read_to_string(&out).expect("read csv");
    let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines[0], "UID,Name,Class,Section,Subjects,Marks");
    assert_eq!(lines[1], "10,Ava Stone,9,A,Art;Math,95.0;95.0");
    assert_eq!(lines[2], "2,Ben Ode,10,B,Math,80.0");
    assert_eq!(lines[4], "3,\"Dee, Jr.\",9,C,,");
    assert_eq!(lines.len(), 5);

    let leftovers: Vec<_> = std::fs::read_dir(out.parent().expect("parent"))
        .expect("read out dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let name = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "e2",
        "export.csvDefaultName",
        json!({}),
    );
    assert_eq!(name["fileName"], json!("students_export.csv"));

    finish(s);
}

#[test]
fn csv_export_with_no_students_is_refused() {
    let workspace = temp_dir("studentd-csv-empty");
    let out = workspace.join("empty.csv");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "select",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "e",
        "export.csv",
        json!({ "outPath": out.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "no_students");
    assert!(!out.exists());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn tiny_jpeg() -> Vec<u8> {
    vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x02, 0x00, 0x02, 0x03, 0x01, 0x22, 0x00, 0x02,
        0x11, 0x01, 0x03, 0x11, 0x01, // SOF0 2x2, 3 components
        0xFF, 0xD9, // EOI
    ]
}

#[test]
fn report_card_embeds_imported_photo() {
    let mut s = seeded("studentd-report");
    let photo_src = s.workspace.join("camera-roll").join("portrait.jpg");
    std::fs::create_dir_all(photo_src.parent().expect("parent")).expect("mkdir");
    std::fs::write(&photo_src, tiny_jpeg()).expect("write photo");

    let updated = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "u",
        "students.update",
        json!({
            "uid": "2",
            "name": "Ben Ode",
            "studentClass": "10",
            "section": "B",
            "subjects": "Math, Science",
            "marks": "80, 70",
            "imagePath": photo_src.to_string_lossy()
        }),
    );
    assert_eq!(updated["warnings"], json!([]));
    assert_eq!(updated["student"]["imageFilename"], json!("images/2.jpg"));
    assert!(s.workspace.join("images").join("2.jpg").is_file());

    let model = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "m",
        "reports.studentCardModel",
        json!({ "uid": "2" }),
    );
    let card = &model["card"];
    assert_eq!(card["title"], json!("Student Report Card"));
    assert_eq!(card["defaultFileName"], json!("2_Ben Ode_Report.pdf"));
    assert!(card["photoPath"].is_string());
    assert_eq!(card["chart"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(card["chartYMax"], json!(100.0));

    let pdf = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "p",
        "reports.studentCardPdf",
        json!({ "uid": "2" }),
    );
    assert_eq!(pdf["photoEmbedded"], json!(true));
    assert_eq!(pdf["chartDrawn"], json!(true));
    assert_eq!(pdf["warnings"], json!([]));

    let path = s
        .workspace
        .join("reports")
        .join("2_Ben Ode_Report.pdf");
    assert_eq!(pdf["path"], json!(path.to_string_lossy()));
    let bytes = std::fs::read(&path).expect("read pdf");
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(bytes.windows(b"/DCTDecode".len()).any(|w| w == b"/DCTDecode"));
    assert!(bytes.windows(b"Ben Ode".len()).any(|w| w == b"Ben Ode"));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let missing = request(
        &mut s.stdin,
        &mut s.reader,
        "p404",
        "reports.studentCardPdf",
        json!({ "uid": "nobody" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    finish(s);
}

#[test]
fn report_without_chart_or_photo_still_renders() {
    let mut s = seeded("studentd-report-plain");
    let out = s.workspace.join("dee.pdf");
    let pdf = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "p",
        "reports.studentCardPdf",
        json!({ "uid": "3", "outPath": out.to_string_lossy(), "includeChart": false }),
    );
    assert_eq!(pdf["photoEmbedded"], json!(false));
    assert_eq!(pdf["chartDrawn"], json!(false));
    assert_eq!(pdf["pages"], json!(1));
    assert!(out.is_file());
    finish(s);
}

#[test]
fn report_card_embeds_png_photo() {
    let mut s = seeded("studentd-report-png");
    let photo_src = s.workspace.join("scan.png");
    image::RgbImage::from_pixel(4, 4, image::Rgb([30, 120, 200]))
        .save(&photo_src)
        .expect("write png");

    let updated = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "u",
        "students.update",
        json!({
            "uid": "10",
            "name": "Ava Stone",
            "studentClass": "9",
            "section": "A",
            "subjects": "Math, Art",
            "marks": "95, 95",
            "imagePath": photo_src.to_string_lossy()
        }),
    );
    assert_eq!(updated["student"]["imageFilename"], json!("images/10.png"));

    let out = s.workspace.join("ava.pdf");
    let pdf = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "p",
        "reports.studentCardPdf",
        json!({ "uid": "10", "outPath": out.to_string_lossy() }),
    );
    assert_eq!(pdf["photoEmbedded"], json!(true));
    assert_eq!(pdf["warnings"], json!([]));
    let bytes = std::fs::read(&out).expect("read pdf");
    assert!(bytes.windows(b"/DCTDecode".len()).any(|w| w == b"/DCTDecode"));

    finish(s);
}
