use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Output spatial size of a convolution along one axis.
///
/// Returns `None` when the dilated kernel does not fit inside the padded input.
pub fn conv_output_len(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    if kernel == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let effective = (kernel - 1) * dilation + 1;
    let padded = input + 2 * padding;
    (padded >= effective).then(|| (padded - effective) / stride + 1)
}

/// 2-D convolution in NCHW layout.
///
/// * `input` - `[batch, in_channels, height, width]`
/// * `weight` - `[out_channels, in_channels, kernel_h, kernel_w]`
/// * `stride`, `padding`, `dilation` - per spatial axis `[h, w]`
///
/// Returns the flat `[batch, out_channels, out_h, out_w]` buffer. Works for integer element
/// types as well, so an identity kernel over a grid of positions yields exact index maps.
pub fn cpu_conv2d<T: KernelElem>(
    input: &[T],
    weight: &[T],
    input_shape: &[usize],
    weight_shape: &[usize],
    stride: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
) -> Result<Vec<T>> {
    if input_shape.len() != 4 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![4],
            got: vec![input_shape.len()],
        });
    }
    if weight_shape.len() != 4 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![4],
            got: vec![weight_shape.len()],
        });
    }
    check_len(input.len(), input_shape)?;
    check_len(weight.len(), weight_shape)?;

    let (batch, in_c, in_h, in_w) = (
        input_shape[0],
        input_shape[1],
        input_shape[2],
        input_shape[3],
    );
    let (out_c, w_in_c, k_h, k_w) = (
        weight_shape[0],
        weight_shape[1],
        weight_shape[2],
        weight_shape[3],
    );

    if in_c != w_in_c {
        return Err(KernelError::ShapeMismatch {
            expected: vec![in_c],
            got: vec![w_in_c],
        });
    }

    let too_small = || KernelError::ShapeMismatch {
        expected: vec![k_h, k_w],
        got: vec![in_h + 2 * padding[0], in_w + 2 * padding[1]],
    };
    let out_h =
        conv_output_len(in_h, k_h, stride[0], padding[0], dilation[0]).ok_or_else(too_small)?;
    let out_w =
        conv_output_len(in_w, k_w, stride[1], padding[1], dilation[1]).ok_or_else(too_small)?;

    let plane = out_h * out_w;
    let mut output = vec![T::zero(); batch * out_c * plane];
    if output.is_empty() {
        return Ok(output);
    }

    // One chunk per (batch, out_channel) plane.
    output
        .par_chunks_mut(plane)
        .enumerate()
        .for_each(|(idx, out_plane)| {
            let b = idx / out_c;
            let oc = idx % out_c;
            let w_base = oc * in_c * k_h * k_w;

            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h0 = (oh * stride[0]) as isize - padding[0] as isize;
                    let w0 = (ow * stride[1]) as isize - padding[1] as isize;
                    let mut acc = T::zero();

                    for ic in 0..in_c {
                        let in_base = (b * in_c + ic) * in_h * in_w;
                        let w_ic = w_base + ic * k_h * k_w;

                        for kh in 0..k_h {
                            let h = h0 + (kh * dilation[0]) as isize;
                            if h < 0 || h >= in_h as isize {
                                continue;
                            }
                            for kw in 0..k_w {
                                let w = w0 + (kw * dilation[1]) as isize;
                                if w < 0 || w >= in_w as isize {
                                    continue;
                                }
                                let x = input[in_base + h as usize * in_w + w as usize];
                                acc += x * weight[w_ic + kh * k_w + kw];
                            }
                        }
                    }

                    out_plane[oh * out_w + ow] = acc;
                }
            }
        });

    Ok(output)
}
