//! Built-in MRI preprocessing pipelines.
//!
//! Commands are opaque templates for FSL, AFNI and FreeSurfer tools. Paths
//! live under the configured roots:
//!
//! - `{orig_root}/<subject>/anat<run>/mprage.nii.gz` and
//!   `{orig_root}/<subject>/<scan><run>/func.nii.gz` are the raw scans.
//! - `{output_root}/<subject>/anat` holds anatomical results.
//! - `{output_root}/<subject>/<scan>/run_NN` holds functional results.

use super::Pipeline;
use crate::stages::{CommandStep, StageSpec};

/// Skull stripping through FreeSurfer, converted back to RPI NIfTI.
#[must_use]
pub fn anat_preproc() -> Pipeline {
    let t1 = "{fsdir}/{subject}/mri/T1.mgz";
    let brainmask = "{fsdir}/{subject}/mri/brainmask.mgz";
    let recon = |step: CommandStep| step.skip_if_exists(t1).skip_if_exists(brainmask);

    let stage = StageSpec::new("skullstrip")
        .input("mprage", "{orig_root}/{subject}/anat{run}/mprage.nii.gz")
        .output("head", "{output_root}/{subject}/anat/head.nii.gz")
        .output("brain", "{output_root}/{subject}/anat/brain.nii.gz")
        .output("brain_mask", "{output_root}/{subject}/anat/brain_mask.nii.gz")
        .work_dir("anatdir", "{output_root}/{subject}/anat")
        .work_dir("fsdir", "{output_root}/freesurfer")
        .step(recon(
            CommandStep::new("fslmaths {mprage} {anatdir}/tmp_mprage_fix.nii.gz")
                .described("Rewriting T1 header so FreeSurfer accepts the slice timing"),
        ))
        .step(recon(
            CommandStep::new(
                "recon-all -i {anatdir}/tmp_mprage_fix.nii.gz -autorecon1 -s {subject} -sd {fsdir}",
            )
            .described("Intensity normalization and skull stripping with FreeSurfer"),
        ))
        .step(
            CommandStep::new(format!("mri_convert {t1} {{anatdir}}/tmp_head.nii.gz"))
                .described("Converting FreeSurfer output to NIfTI"),
        )
        .command(format!("mri_convert {brainmask} {{anatdir}}/tmp_brain.nii.gz"))
        .step(
            CommandStep::new("3dresample -orient RPI -inset {anatdir}/tmp_head.nii.gz -prefix {head}")
                .described("Reorienting head and brain to be FSL friendly"),
        )
        .command("3dresample -orient RPI -inset {anatdir}/tmp_brain.nii.gz -prefix {brain}")
        .step(
            CommandStep::new("3dcalc -a {brain} -expr 'step(a)' -prefix {brain_mask}")
                .described("Generating brain mask"),
        )
        .cleanup("{anatdir}/tmp_*.nii.gz")
        .report("Skull stripping for {subject} run {run}: {status}\n\n- head: `{head}`\n- brain mask: `{brain_mask}`");

    Pipeline::new("anat-preproc", vec![stage])
        .with_description("Skull strip and reorient the T1 anatomical")
}

/// FAST tissue segmentation with thresholded CSF and WM masks.
#[must_use]
pub fn anat_segment() -> Pipeline {
    let stage = StageSpec::new("segment")
        .input("brain", "{output_root}/{subject}/anat/brain.nii.gz")
        .output("csf_mask", "{output_root}/{subject}/anat/csf_mask.nii.gz")
        .output("wm_mask", "{output_root}/{subject}/anat/wm_mask.nii.gz")
        .output("wm_edge", "{output_root}/{subject}/anat/wm_mask_edge.nii.gz")
        .work_dir("segdir", "{output_root}/{subject}/anat/segment")
        .param("csf_thresh", "0.5")
        .param("wm_thresh", "0.5")
        .step(
            CommandStep::new("fast --channels=1 --type=1 --class=3 --out={segdir}/fast {brain}")
                .described("Segmenting skullstripped anatomical"),
        )
        .step(
            CommandStep::new(
                "3dcalc -a {segdir}/fast_pve_0.nii.gz -expr 'step(a-{csf_thresh})' -prefix {csf_mask} -datum short",
            )
            .described("Thresholding CSF mask"),
        )
        .step(
            CommandStep::new(
                "3dcalc -a {segdir}/fast_pve_2.nii.gz -expr 'step(a-{wm_thresh})' -prefix {wm_mask} -datum short",
            )
            .described("Thresholding WM mask"),
        )
        .step(
            CommandStep::new("fslmaths {wm_mask} -edge -bin -mas {wm_mask} {wm_edge}")
                .described("Finding WM edges for checking segmentation and registration"),
        )
        // the partial volume maps stay: registration warps fast_pve_1
        .cleanup("{segdir}/fast_seg.nii.gz")
        .cleanup("{segdir}/fast_mixeltype.nii.gz")
        .report("Segmentation for {subject}: {status}\n\n- CSF: `{csf_mask}`\n- WM: `{wm_mask}`");

    Pipeline::new("anat-segment", vec![stage])
        .with_description("Segment the brain into CSF, grey and white matter")
}

/// Linear and non-linear registration of the anatomical to MNI152.
#[must_use]
pub fn anat_register() -> Pipeline {
    let stage = StageSpec::new("register")
        .input("brain", "{output_root}/{subject}/anat/brain.nii.gz")
        .input("head", "{output_root}/{subject}/anat/head.nii.gz")
        .input("gm", "{output_root}/{subject}/anat/segment/fast_pve_1.nii.gz")
        .input("standard", "{reference_root}/MNI152_T1_{resolution}mm_brain.nii.gz")
        .output("highres2standard", "{output_root}/{subject}/anat/reg/highres2standard.nii.gz")
        .output("gm2std", "{output_root}/{subject}/anat/reg/gm2standard.nii.gz")
        .output("gm2std_smooth", "{output_root}/{subject}/anat/reg/gm2standard_smooth.nii.gz")
        .work_dir("regdir", "{output_root}/{subject}/anat/reg")
        .param("resolution", "2")
        .param("fwhm", "6")
        .step(
            CommandStep::new(
                "flirt -in {brain} -ref {standard} -omat {regdir}/highres2standard.mat -o {highres2standard}",
            )
            .described("Linear registration T1 => standard"),
        )
        .step(
            CommandStep::new(
                "convert_xfm -omat {regdir}/standard2highres.mat -inverse {regdir}/highres2standard.mat",
            )
            .described("Inverting transform to get standard => T1"),
        )
        .step(
            CommandStep::new(
                "fnirt --in={head} --aff={regdir}/highres2standard.mat --cout={regdir}/highres2standard_warp.nii.gz --config=T1_2_MNI152_2mm",
            )
            .described("Non-linear registration T1 head => standard"),
        )
        .step(
            CommandStep::new(
                "applywarp --ref={standard} --in={brain} --warp={regdir}/highres2standard_warp.nii.gz --out={highres2standard}",
            )
            .described("Applying warp T1 brain => standard"),
        )
        .step(
            CommandStep::new("ln -sf {standard} {regdir}/standard.nii.gz")
                .described("Linking standard brain"),
        )
        .step(
            CommandStep::new(
                "applywarp --in={gm} --ref={standard} --warp={regdir}/highres2standard_warp.nii.gz --out={gm2std}",
            )
            .described("Applying warp GM => standard"),
        )
        .step(
            CommandStep::new("3dmerge -1blur_fwhm {fwhm} -doall -prefix {gm2std_smooth} {gm2std}")
                .described("Smoothing GM"),
        )
        .report("Registration for {subject}: {status}\n\n- T1 in standard space: `{highres2standard}`");

    Pipeline::new("anat-register", vec![stage])
        .with_description("Register the anatomical to MNI152 standard space")
}

/// Functional preprocessing for every run of one scan type.
///
/// The first stage builds a motion-correction reference from run 1; later
/// runs find it on disk and skip it.
#[must_use]
pub fn func_preproc() -> Pipeline {
    let reference = StageSpec::new("motion_reference")
        .input("first_run", "{orig_root}/{subject}/{scan}1/func.nii.gz")
        .output("mcref", "{output_root}/{subject}/{scan}/run_01/func_ref.nii.gz")
        .work_dir("refdir", "{output_root}/{subject}/{scan}/run_01")
        .param("scan", "movie")
        .param("exclude", "4")
        .step(
            CommandStep::new(
                "3dresample -orient RPI -inset {first_run}'[{exclude}]' -prefix {refdir}/tmp_ref_reorient.nii.gz",
            )
            .described("Extracting the motion reference from run 1"),
        )
        .command("3dcalc -a {refdir}/tmp_ref_reorient.nii.gz -expr 'a' -prefix {mcref}")
        .cleanup("{refdir}/tmp_ref_*.nii.gz");

    let preprocess = StageSpec::new("preprocess")
        .input("original", "{orig_root}/{subject}/{scan}{run}/func.nii.gz")
        .input("mcref", "{output_root}/{subject}/{scan}/run_01/func_ref.nii.gz")
        .output("motion", "{output_root}/{subject}/{scan}/run_{run:02}/motion.1D")
        .output("brain_mask", "{output_root}/{subject}/{scan}/run_{run:02}/func_mask.nii.gz")
        .output("brain", "{output_root}/{subject}/{scan}/run_{run:02}/func_brain.nii.gz")
        .output("mean", "{output_root}/{subject}/{scan}/run_{run:02}/func_mean.nii.gz")
        .work_dir("ppdir", "{output_root}/{subject}/{scan}/run_{run:02}/01_preprocess")
        .param("scan", "movie")
        .param("exclude", "4")
        .param("tr", "2")
        .param("tpattern", "alt+z")
        .step(
            CommandStep::new(
                "3dcalc -a {original}'[{exclude}..$]' -expr 'a' -prefix {ppdir}/01_exclude_tpts.nii.gz",
            )
            .described("Excluding the first time points"),
        )
        .step(
            CommandStep::new(
                "3dTshift -TR {tr}s -tpattern {tpattern} -prefix {ppdir}/02_slice_time.nii.gz {ppdir}/01_exclude_tpts.nii.gz",
            )
            .described("Slice time correction"),
        )
        .step(
            CommandStep::new("3dcopy {ppdir}/02_slice_time.nii.gz {ppdir}/03_deoblique.nii.gz")
                .described("Deobliquing to be AFNI friendly"),
        )
        .command("3drefit -deoblique {ppdir}/03_deoblique.nii.gz")
        .step(
            CommandStep::new(
                "3dresample -inset {ppdir}/03_deoblique.nii.gz -orient RPI -prefix {ppdir}/04_reorient.nii.gz",
            )
            .described("Reorienting to be FSL friendly"),
        )
        .step(
            CommandStep::new(
                "3dvolreg -Fourier -prefix {ppdir}/05_motion_correct.nii.gz -base {mcref} -1Dfile {motion} {ppdir}/04_reorient.nii.gz",
            )
            .described("Motion correcting against the run 1 reference"),
        )
        .step(
            CommandStep::new("3dAutomask -dilate 1 -prefix {brain_mask} {ppdir}/05_motion_correct.nii.gz")
                .described("Generating brain mask"),
        )
        .step(
            CommandStep::new(
                "3dcalc -a {ppdir}/05_motion_correct.nii.gz -b {brain_mask} -expr 'a*ispositive(b)' -prefix {brain}",
            )
            .described("Applying mask to keep only the brain"),
        )
        .step(
            CommandStep::new("3dTstat -mean -prefix {mean} {brain}").described("Creating average EPI"),
        )
        .cleanup("{ppdir}/01_exclude_tpts.nii.gz")
        .cleanup("{ppdir}/02_slice_time.nii.gz")
        .report("- {scan} run {run}: {status} (motion parameters in `{motion}`)");

    Pipeline::new("func-preproc", vec![reference, preprocess])
        .with_description("Slice timing, motion correction and masking of functional runs")
}

/// Boundary-based registration of the functional mean to the anatomical,
/// chained with the anatomical warp to reach standard space.
///
/// Every run is motion corrected to the run 1 reference, so the run 1 mean
/// stands in for all runs. Outputs are per subject: runs after the first
/// find them on disk and skip.
#[must_use]
pub fn func_register() -> Pipeline {
    let stage = StageSpec::new("func_register")
        .input("example_func", "{output_root}/{subject}/{scan}/run_01/func_mean.nii.gz")
        .input("highres", "{output_root}/{subject}/anat/brain.nii.gz")
        .input("wm_mask", "{output_root}/{subject}/anat/wm_mask.nii.gz")
        .input("highres2standard", "{output_root}/{subject}/anat/reg/highres2standard.mat")
        .input("warp", "{output_root}/{subject}/anat/reg/highres2standard_warp.nii.gz")
        .input("standard", "{reference_root}/MNI152_T1_{resolution}mm_brain.nii.gz")
        .output("func2highres", "{output_root}/{subject}/{scan}/reg/func2highres.mat")
        .output("highres2func", "{output_root}/{subject}/{scan}/reg/highres2func.mat")
        .output("func2standard_mat", "{output_root}/{subject}/{scan}/reg/func2standard.mat")
        .output("standard2func", "{output_root}/{subject}/{scan}/reg/standard2func.mat")
        .output("func2standard", "{output_root}/{subject}/{scan}/reg/func2standard.nii.gz")
        .work_dir("regdir", "{output_root}/{subject}/{scan}/reg")
        .param("scan", "movie")
        .param("resolution", "2")
        .step(
            CommandStep::new(
                "flirt -in {example_func} -ref {highres} -dof 6 -omat {regdir}/func2highres_init.mat -out {regdir}/func2highres_init.nii.gz",
            )
            .described("Initial coregistration EPI => T1"),
        )
        .step(
            CommandStep::new(
                "flirt -in {example_func} -ref {highres} -dof 6 -cost bbr -wmseg {wm_mask} -init {regdir}/func2highres_init.mat -omat {func2highres} -out {regdir}/func2highres.nii.gz -schedule $FSLDIR/etc/flirtsch/bbr.sch",
            )
            .described("Boundary-based coregistration EPI => T1"),
        )
        .step(
            CommandStep::new("convert_xfm -omat {highres2func} -inverse {func2highres}")
                .described("Inverting transform to get T1 => EPI"),
        )
        .step(
            CommandStep::new(
                "convert_xfm -omat {func2standard_mat} -concat {highres2standard} {func2highres}",
            )
            .described("Concatenating EPI => T1 => standard"),
        )
        .command("convert_xfm -omat {standard2func} -inverse {func2standard_mat}")
        .step(
            CommandStep::new(
                "applywarp --in={example_func} --ref={standard} --premat={func2highres} --warp={warp} --out={func2standard}",
            )
            .described("Applying warp EPI => standard"),
        )
        .command("ln -sf {standard} {regdir}/standard.nii.gz")
        .cleanup("{regdir}/func2highres_init.nii.gz")
        .report("Functional registration for {subject} ({scan}): {status}\n\n- EPI in standard space: `{func2standard}`");

    Pipeline::new("func-register", vec![stage])
        .with_description("Register the mean EPI to the anatomical and standard space")
}

/// Nuisance regression: CSF, local white matter and Friston motion signals
/// are regressed out of each run, which is then smoothed within its mask.
#[must_use]
pub fn func_nuisance() -> Pipeline {
    let erode = |input: &str, output: &str| {
        format!(
            "3dcalc -a {input} -b a+i -c a-i -d a+j -e a-j -f a+k -g a-k -expr 'a*(1-amongst(0,b,c,d,e,f,g))' -prefix {output} -overwrite"
        )
    };

    let masks = StageSpec::new("nuisance_masks")
        .input("csf_highres", "{output_root}/{subject}/anat/csf_mask.nii.gz")
        .input("wm_highres", "{output_root}/{subject}/anat/wm_mask.nii.gz")
        .input("example_func", "{output_root}/{subject}/{scan}/run_01/func_mean.nii.gz")
        .input("standard2highres", "{output_root}/{subject}/anat/reg/standard2highres.mat")
        .input("highres2func", "{output_root}/{subject}/{scan}/reg/highres2func.mat")
        .input("csf_prior", "{reference_root}/avg152T1_csf_bin.nii.gz")
        .output("csf_mask", "{output_root}/{subject}/{scan}/segment/csf_mask.nii.gz")
        .output("wm_mask", "{output_root}/{subject}/{scan}/segment/wm_mask.nii.gz")
        .work_dir("segdir", "{output_root}/{subject}/{scan}/segment")
        .param("scan", "movie")
        .step(
            CommandStep::new(
                "3dresample -input {csf_highres} -dxyz 2 2 2 -rmode NN -prefix {segdir}/csf_01_mask_unthr.nii.gz -overwrite",
            )
            .described("Downsampling CSF mask to 2mm"),
        )
        .command(
            "3dcalc -a {segdir}/csf_01_mask_unthr.nii.gz -expr 'step(a-0.5)' -prefix {segdir}/csf_02_mask_thr+bin.nii.gz -datum short -overwrite",
        )
        .step(
            CommandStep::new(erode(
                "{segdir}/csf_02_mask_thr+bin.nii.gz",
                "{segdir}/csf_03_mask_erode.nii.gz",
            ))
            .described("Eroding CSF mask"),
        )
        .step(
            CommandStep::new(
                "flirt -in {csf_prior} -ref {segdir}/csf_01_mask_unthr.nii.gz -out {segdir}/csfprior_01_unthr.nii.gz -applyxfm -init {standard2highres}",
            )
            .described("Restricting CSF to the ventricles with the standard prior"),
        )
        .command(
            "3dcalc -a {segdir}/csfprior_01_unthr.nii.gz -expr 'step(a-0.5)' -prefix {segdir}/csfprior_02_thr.nii.gz -overwrite",
        )
        .command(
            "3dcalc -a {segdir}/csf_03_mask_erode.nii.gz -b {segdir}/csfprior_02_thr.nii.gz -expr 'a*b' -prefix {segdir}/csf_04_mask_prior.nii.gz -overwrite",
        )
        .command("ln -sf {segdir}/csf_04_mask_prior.nii.gz {csf_mask}")
        .step(
            CommandStep::new(
                "flirt -in {wm_highres} -ref {example_func} -out {segdir}/wm_01_mask2func.nii.gz -init {highres2func} -applyxfm",
            )
            .described("Transforming WM mask to EPI space"),
        )
        .command(
            "3dcalc -a {segdir}/wm_01_mask2func.nii.gz -expr 'step(a-0.5)' -prefix {segdir}/wm_02_mask_thr.nii.gz -overwrite",
        )
        .step(
            CommandStep::new(erode(
                "{segdir}/wm_02_mask_thr.nii.gz",
                "{segdir}/wm_03_mask_erode.nii.gz",
            ))
            .described("Eroding WM mask"),
        )
        .command("ln -sf {segdir}/wm_03_mask_erode.nii.gz {wm_mask}")
        .cleanup("{segdir}/csfprior_01_unthr.nii.gz");

    let regression = StageSpec::new("nuisance_regression")
        .input("func", "{output_root}/{subject}/{scan}/run_{run:02}/func_brain.nii.gz")
        .input("func_mask", "{output_root}/{subject}/{scan}/run_{run:02}/func_mask.nii.gz")
        .input("motion", "{output_root}/{subject}/{scan}/run_{run:02}/motion.1D")
        .input("func2highres", "{output_root}/{subject}/{scan}/reg/func2highres.mat")
        .input("csf_mask", "{output_root}/{subject}/{scan}/segment/csf_mask.nii.gz")
        .input("wm_mask", "{output_root}/{subject}/{scan}/segment/wm_mask.nii.gz")
        .output("csf_ts", "{output_root}/{subject}/{scan}/run_{run:02}/02_nuisance/ts_csf.1D")
        .output("wm_ts", "{output_root}/{subject}/{scan}/run_{run:02}/02_nuisance/ts_wm.nii.gz")
        .output(
            "motion_friston",
            "{output_root}/{subject}/{scan}/run_{run:02}/02_nuisance/ts_motion_friston.1D",
        )
        .output("denoised", "{output_root}/{subject}/{scan}/run_{run:02}/func_denoise.nii.gz")
        .output(
            "smoothed",
            "{output_root}/{subject}/{scan}/run_{run:02}/func_denoise+smooth.nii.gz",
        )
        .work_dir("nvrdir", "{output_root}/{subject}/{scan}/run_{run:02}/02_nuisance")
        .param("scan", "movie")
        .param("fwhm", "6")
        .param("wm_radius", "30")
        .param("tr", "2")
        .step(
            CommandStep::new(
                "flirt -in {func} -ref {csf_mask} -out {nvrdir}/func2highres_2mm.nii.gz -init {func2highres} -applyisoxfm 2",
            )
            .described("Transforming EPI to T1 space at 2mm"),
        )
        .step(
            CommandStep::new("3dmaskave -q -mask {csf_mask} {nvrdir}/func2highres_2mm.nii.gz > {csf_ts}")
                .described("Extracting CSF time series"),
        )
        .step(
            CommandStep::new(
                "3dLocalstat -prefix {nvrdir}/wm_04_local_ts.nii.gz -nbhd 'SPHERE({wm_radius})' -stat mean -mask {wm_mask} -use_nonmask {func}",
            )
            .described("Averaging the nearest WM voxels"),
        )
        .command("3dDetrend -normalize -prefix {wm_ts} -polort A {nvrdir}/wm_04_local_ts.nii.gz")
        .step(
            CommandStep::new("mask_friston_motion.pl {motion} > {motion_friston}")
                .described("Expanding motion parameters with the Friston 24 model"),
        )
        .command("1dcat {csf_ts} {motion_friston} > {nvrdir}/csf+motion.1D")
        .command(
            "3dDetrend -DAFNI_1D_TRANOUT=YES -normalize -prefix {nvrdir}/csf+motion_detrend.1D -polort A {nvrdir}/csf+motion.1D\\' -overwrite",
        )
        .step(
            CommandStep::new(
                "3dTfitter -polort A -RHS {func} -LHS {nvrdir}/csf+motion_detrend.1D {wm_ts} -prefix {nvrdir}/nvr_beta.nii.gz -fitts {nvrdir}/nvr_fitts.nii.gz -errsum {nvrdir}/nvr_errsum.nii.gz",
            )
            .described("Fitting nuisance regressors"),
        )
        .step(
            CommandStep::new(
                "3dcalc -float -a {func} -b {nvrdir}/nvr_fitts.nii.gz -expr 'a-b' -prefix {denoised}",
            )
            .described("Removing the fitted nuisance signal"),
        )
        .command("3drefit -TR {tr} {denoised}")
        .step(
            CommandStep::new(
                "3dBlurInMask -input {denoised} -FWHM {fwhm} -mask {func_mask} -prefix {smoothed}",
            )
            .described("Smoothing within the brain mask"),
        )
        .cleanup("{nvrdir}/func2highres_2mm.nii.gz")
        .cleanup("{nvrdir}/wm_04_local_ts.nii.gz")
        .report("- {scan} run {run}: {status} (denoised: `{denoised}`)");

    Pipeline::new("func-nuisance", vec![masks, regression])
        .with_description("Regress CSF, white matter and motion signals out of functional runs")
}

/// Warps each denoised run to standard space and smooths it there.
#[must_use]
pub fn func_applyreg() -> Pipeline {
    let stage = StageSpec::new("func_applyreg")
        .input("denoised", "{output_root}/{subject}/{scan}/run_{run:02}/func_denoise.nii.gz")
        .input("func2highres", "{output_root}/{subject}/{scan}/reg/func2highres.mat")
        .input("warp", "{output_root}/{subject}/anat/reg/highres2standard_warp.nii.gz")
        .input("standard", "{reference_root}/MNI152_T1_{resolution}mm_brain.nii.gz")
        .output(
            "denoised2std",
            "{output_root}/{subject}/{scan}/run_{run:02}/func_denoise2standard.nii.gz",
        )
        .output(
            "smoothed2std",
            "{output_root}/{subject}/{scan}/run_{run:02}/func_denoise+smooth2standard.nii.gz",
        )
        .param("scan", "movie")
        .param("resolution", "3")
        .param("fwhm", "6")
        .step(
            CommandStep::new(
                "applywarp --in={denoised} --ref={standard} --premat={func2highres} --warp={warp} --out={denoised2std}",
            )
            .described("Applying warp EPI => standard"),
        )
        .step(
            CommandStep::new(
                "3dmerge -1blur_fwhm {fwhm} -doall -prefix {smoothed2std} {denoised2std}",
            )
            .described("Smoothing in standard space"),
        )
        .report("- {scan} run {run} in standard space: {status} (`{smoothed2std}`)");

    Pipeline::new("func-applyreg", vec![stage])
        .with_description("Warp denoised functional runs to standard space")
}

/// Skull stripping, segmentation and registration in one pass.
#[must_use]
pub fn anat() -> Pipeline {
    let stages = [anat_preproc(), anat_segment(), anat_register()]
        .into_iter()
        .flat_map(|p| p.stages)
        .collect();

    Pipeline::new("anat", stages)
        .with_description("Full anatomical chain: skull strip, segment, register")
}

/// Every built-in pipeline.
#[must_use]
pub fn all() -> Vec<Pipeline> {
    vec![
        anat_preproc(),
        anat_segment(),
        anat_register(),
        anat(),
        func_preproc(),
        func_register(),
        func_nuisance(),
        func_applyreg(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Bindings;

    #[test]
    fn test_builtin_pipelines_validate() {
        for pipeline in all() {
            if let Err(err) = pipeline.validate_with(&Bindings::new()) {
                panic!("{} is invalid: {err}", pipeline.name);
            }
        }
    }

    #[test]
    fn test_reference_root_only_for_registration() {
        assert!(anat_register().uses_placeholder("reference_root"));
        assert!(anat().uses_placeholder("reference_root"));
        assert!(!anat_segment().uses_placeholder("reference_root"));
        assert!(!func_preproc().uses_placeholder("reference_root"));
        assert!(func_register().uses_placeholder("reference_root"));
        assert!(func_nuisance().uses_placeholder("reference_root"));
        assert!(func_applyreg().uses_placeholder("reference_root"));
    }

    #[test]
    fn test_nuisance_regression_resolves_per_run() {
        let pipeline = func_nuisance();
        let stage = pipeline.stage("nuisance_regression").unwrap();
        let scope = Bindings::for_unit("A", "2")
            .with("output_root", "/out")
            .layered(&stage.params)
            .with("wm_radius", "20");

        let resolved = stage.resolve(&scope).unwrap();
        assert_eq!(
            resolved.work_dirs[0].to_str(),
            Some("/out/A/movie/run_02/02_nuisance")
        );
        assert!(resolved
            .steps
            .iter()
            .any(|step| step.command.contains("'SPHERE(20)'")));
        assert!(resolved
            .steps
            .iter()
            .any(|step| step.command.ends_with("-prefix /out/A/movie/run_02/func_denoise+smooth.nii.gz")));
    }

    #[test]
    fn test_func_run_directories_are_padded() {
        let pipeline = func_preproc();
        let stage = pipeline.stage("preprocess").unwrap();
        let scope = Bindings::for_unit("A", "3")
            .with("orig_root", "/orig")
            .with("output_root", "/out")
            .layered(&stage.params);

        let resolved = stage.resolve(&scope).unwrap();
        assert_eq!(
            resolved.work_dirs[0].to_str(),
            Some("/out/A/movie/run_03/01_preprocess")
        );
        assert_eq!(resolved.inputs[0].to_str(), Some("/orig/A/movie3/func.nii.gz"));
    }

    #[test]
    fn test_segment_thresholds_overridable() {
        let pipeline = anat_segment();
        let stage = &pipeline.stages[0];
        let scope = Bindings::for_unit("A", "1")
            .with("output_root", "/out")
            .layered(&stage.params)
            .with("csf_thresh", "0.75");

        let resolved = stage.resolve(&scope).unwrap();
        assert!(resolved.steps[1].command.contains("step(a-0.75)"));
        assert!(resolved.steps[2].command.contains("step(a-0.5)"));
    }
}
