use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use section_ranker_core::models::{PerDocumentResult, Summary};
use section_ranker_core::{
    ConfigError, EmbeddingIndex, HashingEncoder, HybridRanker, LexicalCrossScorer,
    LopdfWordSource, Pipeline, PipelineOptions, RankerConfig,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const PAGE_HEIGHT: i64 = 792;

/// One text line: layout top, font size, bold flag, text.
type Row<'a> = (i64, i64, bool, &'a str);

fn write_pdf(path: &Path, pages: &[Vec<Row<'_>>]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Bold",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for rows in pages {
        let mut operations = Vec::new();
        for (top, size, is_bold, text) in rows {
            let font = if *is_bold { "F2" } else { "F1" };
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec![font.into(), Object::Integer(*size)]));
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(72), Object::Integer(PAGE_HEIGHT - top - size)],
            ));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

fn finance_report() -> Vec<Vec<Row<'static>>> {
    vec![
        vec![
            (60, 24, true, "Quarterly Finance Review"),
            (200, 14, true, "1. Revenue Growth"),
            (230, 10, false, "Revenue growth reached twelve percent across all regions this year"),
            (244, 10, false, "driven by new markets and steady pricing in every revenue segment"),
            (400, 14, true, "2. Staffing"),
            (430, 10, false, "Headcount stayed flat while hiring focused on support roles only"),
        ],
        vec![
            (40, 14, true, "3. Regional Markets"),
            (70, 10, false, "Europe and Asia markets delivered most of the regional revenue growth"),
            (84, 10, false, "with new distribution partners opening several additional markets"),
        ],
    ]
}

fn garden_guide() -> Vec<Vec<Row<'static>>> {
    vec![vec![
        (60, 24, true, "Backyard Garden Guide"),
        (200, 14, true, "1. Soil Preparation"),
        (230, 10, false, "Mix compost into the soil two weeks before planting tomatoes and herbs"),
        (244, 10, false, "and water deeply so roots settle into loose and well drained beds"),
    ]]
}

fn notes() -> Vec<Vec<Row<'static>>> {
    vec![vec![
        (60, 24, true, "Meeting Notes"),
        (200, 14, true, "1. Revenue Questions"),
        (230, 10, false, "Several attendees asked about revenue growth in new regional markets"),
    ]]
}

fn hashing_pipeline(
    options: PipelineOptions,
) -> Result<Pipeline<LopdfWordSource>, ConfigError> {
    let index = EmbeddingIndex::new(
        Box::new(HashingEncoder::default()),
        Box::new(LexicalCrossScorer::default()),
    );
    Pipeline::new(
        LopdfWordSource,
        HybridRanker::new(index, RankerConfig::default()),
        options,
    )
}

fn write_corpus(input: &Path, request: &str) -> Result<(), Box<dyn std::error::Error>> {
    let pdfs = input.join("PDFs");
    fs::create_dir_all(&pdfs)?;
    fs::write(input.join("input.json"), request)?;

    write_pdf(&pdfs.join("report_finance.pdf"), &finance_report())?;
    write_pdf(&pdfs.join("report_garden.pdf"), &garden_guide())?;
    write_pdf(&pdfs.join("notes.pdf"), &notes())?;
    write_pdf(&pdfs.join("blank.pdf"), &[Vec::new()])?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn ranks_sections_and_records_skips() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_corpus(
        &input,
        r#"{
            "persona": {"role": "Financial analyst"},
            "job_to_be_done": {"task": "Summarize results"},
            "query": {"selected_text": "revenue growth in regional markets"}
        }"#,
    )?;
    fs::create_dir_all(&output)?;
    fs::write(output.join("stale.json"), b"{}")?;

    let options = PipelineOptions {
        max_docs: None,
        ..PipelineOptions::default()
    };
    let run = hashing_pipeline(options)?.run(&input, &output)?;

    assert!(!output.join("stale.json").exists());
    assert_eq!(run.summary_path, output.join("output.json"));

    let summary: Summary = read_json(&run.summary_path)?;
    assert_eq!(summary, run.summary);
    assert_eq!(summary.metadata.query, "revenue growth in regional markets");
    assert_eq!(summary.doc_scores.len(), 4);
    assert_eq!(summary.metadata.input_documents.len(), 4);

    let blank = summary
        .summary
        .skipped
        .iter()
        .find(|skip| skip.file == "blank.pdf")
        .ok_or("blank.pdf should be skipped")?;
    assert!(blank.error.is_some());

    let finance = summary
        .summary
        .processed
        .iter()
        .find(|entry| entry.file == "report_finance.pdf")
        .ok_or("report_finance.pdf should be processed")?;
    assert_eq!(finance.output, "report_finance_output.json");

    let result: PerDocumentResult = read_json(&output.join(&finance.output))?;
    assert_eq!(result.metadata.source_file, "report_finance.pdf");
    assert!(!result.extracted_sections.is_empty());
    assert!(result.extracted_sections.len() <= 2);
    assert_eq!(
        result.extracted_sections.len(),
        result.subsection_analysis.len()
    );
    for (position, section) in result.extracted_sections.iter().enumerate() {
        assert_eq!(section.importance_rank, position + 1);
        assert_eq!(section.document, "report_finance.pdf");
        assert!(section.page_number <= 1);
    }
    for analysis in &result.subsection_analysis {
        assert!(analysis.refined_text.split_whitespace().count() >= 8);
        assert!(analysis.refined_text.chars().count() <= 1_500);
    }
    let titles: Vec<&str> = result
        .extracted_sections
        .iter()
        .map(|section| section.section_title.as_str())
        .collect();
    assert!(!titles.contains(&"2. Staffing"));
    Ok(())
}

#[test]
fn input_filters_exclude_documents_from_gating() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_corpus(
        &input,
        r#"{
            "query": {"selected_text": "revenue growth"},
            "filters": {"allow_docs": "^report_"}
        }"#,
    )?;

    let run = hashing_pipeline(PipelineOptions::default())?.run(&input, &output)?;

    let scored: Vec<&str> = run
        .summary
        .doc_scores
        .iter()
        .map(|score| score.file.as_str())
        .collect();
    assert_eq!(scored.len(), 2);
    assert!(!scored.contains(&"notes.pdf"));
    assert!(!scored.contains(&"blank.pdf"));
    assert!(!run
        .summary
        .metadata
        .input_documents
        .contains(&"notes.pdf".to_string()));
    Ok(())
}

#[test]
fn command_line_deny_overrides_input_filters() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_corpus(&input, r#"{"filters": {"allow_docs": ["notes"]}}"#)?;

    let options = PipelineOptions {
        allow_docs: Some(vec!["\\.pdf$".to_string()]),
        deny_docs: Some(vec!["^report_".to_string(), "blank".to_string()]),
        ..PipelineOptions::default()
    };
    let run = hashing_pipeline(options)?.run(&input, &output)?;

    assert_eq!(run.summary.metadata.input_documents, vec!["notes.pdf"]);
    Ok(())
}

#[test]
fn empty_corpus_still_writes_summary() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(input.join("PDFs"))?;
    fs::write(input.join("input.json"), b"{}")?;

    let run = hashing_pipeline(PipelineOptions::default())?.run(&input, &output)?;

    let summary: Summary = read_json(&output.join("output.json"))?;
    assert_eq!(summary, run.summary);
    assert!(summary.doc_scores.is_empty());
    assert!(summary.summary.processed.is_empty());
    assert!(summary.summary.skipped.is_empty());
    Ok(())
}

#[test]
fn missing_input_json_fails_before_touching_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(input.join("PDFs"))?;

    let result = hashing_pipeline(PipelineOptions::default())?.run(&input, &output);

    assert!(matches!(result, Err(ConfigError::MissingInput(_))));
    assert!(!output.exists());
    Ok(())
}
