use anyhow::{bail, Context, Result};
use colored::{ColoredString, Colorize};
use curricula_core::analytics::{compare_students, curriculum_progress, student_performance};
use curricula_core::{Catalog, CsvCatalogLoader, CurriculaConfig, ValidationReport};
use curricula_engine::{Recommendation, RecommenderService, TrainingPipeline, OBLIGATORY_COURSES};

pub fn train(config: CurriculaConfig) -> Result<()> {
    println!("{}", "Training models...".cyan().bold());

    let models_dir = config.models.models_dir.clone();
    let summary = TrainingPipeline::new(config).run()?;
    let manifest = &summary.manifest;

    println!();
    println!(
        "  {} {} students, {} courses, {} tracks",
        "Catalog:".bold(),
        manifest.num_students,
        manifest.num_courses,
        manifest.num_tracks
    );
    println!(
        "  {} kg={} cf={} fusion input={}",
        "Dimensions:".bold(),
        manifest.kg_dimensions,
        manifest.cf_factors,
        manifest.fusion_input_dim
    );
    println!(
        "  {} {} pairs, final loss {}",
        "Fusion:".bold(),
        manifest.num_training_pairs,
        manifest
            .epoch_losses
            .last()
            .map(|l| format!("{:.4}", l))
            .unwrap_or_else(|| "n/a".to_string())
    );
    if !summary.validation.warnings.is_empty() {
        println!(
            "  {} {}",
            "Data warnings:".yellow().bold(),
            summary.validation.warnings.len()
        );
    }

    println!(
        "\n{} {} ({:.1}s)",
        "Models saved to".green().bold(),
        models_dir.display(),
        summary.elapsed_secs
    );

    Ok(())
}

pub fn recommend(config: &CurriculaConfig, student: &str, top_k: usize, json: bool) -> Result<()> {
    let service = RecommenderService::load(config)?;
    if !service.has_student(student) {
        bail!("Student '{}' not found in history", student);
    }

    let recs = service.recommend(student, top_k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recs)?);
        return Ok(());
    }

    println!(
        "{} {}\n",
        "Recommendations for".cyan().bold(),
        student.white().bold()
    );
    if recs.is_empty() {
        println!("{}", "No eligible courses.".yellow());
        return Ok(());
    }

    println!(
        "{:<4} {:<10} {:<40} {:<9} {:>8}",
        "#".bold(),
        "Code".bold(),
        "Name".bold(),
        "Tier".bold(),
        "Score".bold()
    );
    println!("{}", "─".repeat(80).dimmed());

    for (rank, rec) in recs.iter().enumerate() {
        println!(
            "{:<4} {:<10} {:<40} {:<9} {:>8.4}",
            rank + 1,
            rec.course_code,
            truncate(&rec.course_name, 40),
            tier_label(rec),
            rec.score
        );
        println!("     {}", reason_line(rec).dimmed());
    }

    Ok(())
}

pub fn validate(config: &CurriculaConfig) -> Result<()> {
    let catalog = load_catalog(config)?;
    let report = ValidationReport::build(&catalog);

    println!("{}\n", "Data Validation".cyan().bold());
    println!(
        "  {} courses, {} students, {} records",
        report.stats.num_courses, report.stats.num_students, report.stats.num_records
    );
    println!(
        "  {:.1} courses per student, average grade {:.2}\n",
        report.stats.avg_courses_per_student, report.stats.avg_grade
    );

    for issue in &report.issues {
        println!("  {} {}", "ISSUE".red().bold(), issue);
    }
    for warning in &report.warnings {
        println!("  {} {}", "WARN".yellow(), warning);
    }

    if report.valid {
        println!(
            "\n{} {} warning(s)",
            "Data is valid.".green().bold(),
            report.warnings.len()
        );
        Ok(())
    } else {
        bail!("{} validation issue(s) found", report.issues.len())
    }
}

pub fn analyze(config: &CurriculaConfig, student: &str, compare: Option<&str>) -> Result<()> {
    let catalog = load_catalog(config)?;
    if !catalog.has_student(student) {
        bail!("Student '{}' not found in history", student);
    }
    let threshold = curricula_core::DEFAULT_PASS_THRESHOLD;

    let performance = student_performance(&catalog, student, threshold);
    println!("{} {}\n", "Student".cyan().bold(), student.white().bold());
    println!(
        "  {} {}/{} passed ({:.1}%), average passed grade {:.2}",
        "Courses:".bold(),
        performance.passed_courses,
        performance.total_courses,
        performance.pass_rate,
        performance.avg_grade_passed
    );

    if !performance.track_performance.is_empty() {
        println!("  {}", "Tracks:".bold());
        for (track, avg) in &performance.track_performance {
            println!("    {:<24} {:.2}", track, avg);
        }
    }
    if let Some((track, avg)) = &performance.best_track {
        println!("  {} {} ({:.2})", "Best track:".green(), track, avg);
    }
    if let Some((track, avg)) = &performance.worst_track {
        println!("  {} {} ({:.2})", "Worst track:".yellow(), track, avg);
    }

    let progress = curriculum_progress(&catalog, student, OBLIGATORY_COURSES, threshold);
    println!(
        "\n  {} {}/{} obligatory courses ({:.1}%)",
        "Progress:".bold(),
        progress.obligatory_passed,
        progress.total_obligatory,
        progress.progress_percentage
    );
    if !progress.obligatory_failed.is_empty() {
        println!(
            "  {} {}",
            "Failed:".red().bold(),
            progress.obligatory_failed.join(", ")
        );
    }
    println!(
        "  {} {}",
        "Pending:".bold(),
        progress.obligatory_pending.len()
    );

    if let Some(other) = compare {
        if !catalog.has_student(other) {
            bail!("Student '{}' not found in history", other);
        }
        let comparison = compare_students(&catalog, student, other, threshold);
        println!(
            "\n{} {} vs {}: similarity {:.3}",
            "Comparison".cyan().bold(),
            comparison.student_a,
            comparison.student_b,
            comparison.similarity
        );
        println!("  common:      {}", comparison.common_courses.join(", "));
        println!("  only {}: {}", comparison.student_a, comparison.only_a.join(", "));
        println!("  only {}: {}", comparison.student_b, comparison.only_b.join(", "));
    }

    Ok(())
}

fn load_catalog(config: &CurriculaConfig) -> Result<Catalog> {
    let loader = CsvCatalogLoader::new(&config.data.data_dir);
    Catalog::from_provider(&loader).with_context(|| {
        format!(
            "Failed to load catalog from {}",
            config.data.data_dir.display()
        )
    })
}

fn tier_label(rec: &Recommendation) -> ColoredString {
    match rec.priority {
        1 => "FAILED".red().bold(),
        2 => "REQUIRED".yellow(),
        _ => "ELECTIVE".normal(),
    }
}

fn reason_line(rec: &Recommendation) -> String {
    let mut line = format!(
        "content {:.3} · collaborative {:.3} · track {:.3}",
        rec.reasons.content_similarity,
        rec.reasons.collaborative_score,
        rec.reasons.track_performance
    );
    if !rec.tracks.is_empty() {
        line.push_str(&format!(" · {}", rec.tracks.join(", ")));
    }
    line
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let kept: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
